use async_trait::async_trait;
use log::{ debug, warn };
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::cli::Args;
use crate::error::ChatError;
use crate::models::chat::ChatMessage;

/// One page of conversation history as returned by the REST API.
#[derive(Clone, Debug, Default)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub total: u64,
}

/// REST surface consumed by the paginator and the guest migration path.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Fetch one page of a conversation, newest pages first (page 1 is the
    /// most recent).
    async fn fetch_page(
        &self,
        conversation_id: i64,
        page: u32,
        page_size: u32
    ) -> Result<HistoryPage, ChatError>;

    /// Persist a bot/AI-authored message directly, bypassing the user send
    /// path. Fire-and-forget; the response body is not consumed.
    async fn save_bot_message(
        &self,
        conversation_id: Option<i64>,
        message: &str,
        session_id: Option<&str>
    ) -> Result<(), ChatError>;
}

pub struct RestHistoryApi {
    client: reqwest::Client,
    base_url: String,
    tenant_id: String,
    api_token: Option<String>,
}

impl RestHistoryApi {
    pub fn new(args: &Args) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: args.api_url.trim_end_matches('/').to_string(),
            tenant_id: args.tenant_id.clone(),
            api_token: args.api_token.clone(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("x-tenant-id", &self.tenant_id);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl HistoryApi for RestHistoryApi {
    async fn fetch_page(
        &self,
        conversation_id: i64,
        page: u32,
        page_size: u32
    ) -> Result<HistoryPage, ChatError> {
        let url = format!("{}/chat/messages", self.base_url);
        debug!("Fetching history page {} for conversation {}", page, conversation_id);
        let response = self
            .request(self.client.get(&url))
            .query(
                &[
                    ("conversationId", conversation_id.to_string()),
                    ("page", page.to_string()),
                    ("pageSize", page_size.to_string()),
                ]
            )
            .send().await?
            .error_for_status()?;

        let body: JsonValue = response.json().await?;
        Ok(parse_history_page(&body))
    }

    async fn save_bot_message(
        &self,
        conversation_id: Option<i64>,
        message: &str,
        session_id: Option<&str>
    ) -> Result<(), ChatError> {
        let url = format!("{}/chat/bot-message", self.base_url);
        let payload =
            serde_json::json!({
            "conversationId": conversation_id,
            "message": message,
            "sessionId": session_id,
        });
        self.request(self.client.post(&url)).json(&payload).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Decode a history response body, tolerating an absent or malformed
/// `messages` array (read as empty) and an absent `pagination` object (read
/// as no further pages). Individual unreadable entries are skipped.
pub fn parse_history_page(body: &JsonValue) -> HistoryPage {
    let mut messages = Vec::new();
    if let Some(entries) = body.get("messages").and_then(|v| v.as_array()) {
        for entry in entries {
            match serde_json::from_value::<ChatMessage>(entry.clone()) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("Skipping unreadable history entry: {}", e),
            }
        }
    }

    let pagination = body.get("pagination");
    let has_more = pagination
        .and_then(|p| p.get("hasMore"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let total = pagination
        .and_then(|p| p.get("total"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    HistoryPage { messages, has_more, total }
}
