use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };

/// Closed set of message author kinds. Rendering and business rules key off
/// this tag; only `User` and `Guest` messages may trigger an automated reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderType {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "GUEST")]
    Guest,
    #[serde(rename = "BOT")]
    Bot,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "AI")]
    Ai,
}

impl SenderType {
    /// Whether a message from this sender may trigger the auto-responder.
    pub fn triggers_auto_reply(&self) -> bool {
        matches!(self, SenderType::User | SenderType::Guest)
    }
}

/// Delivery state of a message as seen by the local participant.
///
/// `Local` marks a guest message that lives only in client-side storage and
/// has never reached the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
    Local,
}

/// Message identity. A message starts life under a client-generated
/// correlation token and is swapped to the server-assigned numeric id on
/// confirmation. Modeled as a tagged union instead of a field whose type
/// changes over time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Confirmed(i64),
    Pending(String),
}

impl MessageId {
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Pending(_) => None,
        }
    }

    pub fn pending_token(&self) -> Option<&str> {
        match self {
            MessageId::Confirmed(_) => None,
            MessageId::Pending(token) => Some(token.as_str()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<i64>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    #[serde(rename = "senderId", default)]
    pub sender_id: Option<i64>,
    #[serde(rename = "senderType")]
    pub sender_type: SenderType,
    pub message: String,
    /// Opaque structured payload (sender context, tenant id, guest flags).
    /// Passed through unmodified.
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Inbound pushed messages carry no status field; anything the server
    /// relays is past the delivery pipeline already.
    #[serde(default = "default_status")]
    pub status: MessageStatus,
    /// Correlation token while the message is unreconciled; cleared once the
    /// server-assigned id has replaced it.
    #[serde(rename = "tempId", default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

fn default_status() -> MessageStatus {
    MessageStatus::Sent
}

impl ChatMessage {
    /// Sort key used by the message store: numeric id when confirmed,
    /// otherwise the creation timestamp in milliseconds.
    pub fn sort_key(&self) -> i64 {
        match self.id.confirmed() {
            Some(id) => id,
            None => self.created_at.timestamp_millis(),
        }
    }
}

/// Pagination cursor for backward history fetches, reset whenever the active
/// conversation changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    pub total_messages: u64,
}

impl PageCursor {
    pub fn new(page_size: u32) -> Self {
        Self { page: 0, page_size, has_more: true, total_messages: 0 }
    }

    pub fn reset(&mut self) {
        self.page = 0;
        self.has_more = true;
        self.total_messages = 0;
    }
}
