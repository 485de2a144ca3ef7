use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, MessageStatus, SenderType };
use crate::storage::{ self, LocalStorage, GUEST_SESSION_KEY };

/// The two identity branches a chat participant can be in. Exactly one is
/// active per connection context; every `is_guest` decision in the rest of
/// the crate is a match on this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Guest {
        session_id: String,
    },
    User {
        user_id: i64,
        conversation_id: Option<i64>,
        admin: bool,
    },
}

impl Identity {
    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest { .. })
    }

    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            Identity::Guest { .. } => None,
            Identity::User { conversation_id, .. } => *conversation_id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Identity::Guest { session_id } => Some(session_id.as_str()),
            Identity::User { .. } => None,
        }
    }

    pub fn sender_type(&self) -> SenderType {
        match self {
            Identity::Guest { .. } => SenderType::Guest,
            Identity::User { admin: true, .. } => SenderType::Admin,
            Identity::User { .. } => SenderType::User,
        }
    }
}

/// Decides which identity branch governs the session and owns every write to
/// the persisted guest artifacts.
pub struct IdentityResolver {
    storage: Arc<dyn LocalStorage>,
}

impl IdentityResolver {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn LocalStorage> {
        &self.storage
    }

    /// Resolve the active identity. An authenticated user id wins; otherwise
    /// the persisted guest session id is reused or lazily created.
    pub async fn resolve(
        &self,
        user_id: Option<i64>,
        admin: bool
    ) -> Result<Identity, ChatError> {
        match user_id {
            Some(user_id) => Ok(Identity::User { user_id, conversation_id: None, admin }),
            None => {
                let session_id = self.ensure_guest_session().await?;
                Ok(Identity::Guest { session_id })
            }
        }
    }

    /// Load the persisted guest session id, generating and persisting a fresh
    /// one on first use so it survives reloads within the same client.
    pub async fn ensure_guest_session(&self) -> Result<String, ChatError> {
        if let Some(existing) = self.storage.get(GUEST_SESSION_KEY).await? {
            return Ok(existing);
        }
        let session_id = new_guest_session_id();
        self.storage.set(GUEST_SESSION_KEY, &session_id).await?;
        info!("Created guest session: {}", session_id);
        Ok(session_id)
    }

    pub async fn load_local_messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        storage::load_local_messages(self.storage.as_ref()).await
    }

    pub async fn store_local_messages(
        &self,
        messages: &[ChatMessage]
    ) -> Result<(), ChatError> {
        storage::store_local_messages(self.storage.as_ref(), messages).await
    }

    /// Drop every persisted guest artifact. Called on the guest-to-
    /// authenticated transition.
    pub async fn clear_guest_state(&self) -> Result<(), ChatError> {
        storage::clear_guest_state(self.storage.as_ref()).await
    }
}

/// Guest session ids are current-time plus a random suffix, unique enough
/// for an ephemeral identity and sortable by creation time.
pub fn new_guest_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Split a guest's locally-cached messages for migration: user/guest-authored
/// ones are replayed through the normal send path, bot/AI-authored ones are
/// persisted through the bot-save call instead of being re-sent as if the
/// user wrote them. Anything not in `Local` status has nothing to migrate.
pub fn partition_local_messages(
    messages: Vec<ChatMessage>
) -> (Vec<ChatMessage>, Vec<ChatMessage>) {
    let mut to_resend = Vec::new();
    let mut to_persist = Vec::new();
    for msg in messages {
        if msg.status != MessageStatus::Local {
            continue;
        }
        match msg.sender_type {
            SenderType::User | SenderType::Guest => to_resend.push(msg),
            SenderType::Bot | SenderType::Ai => to_persist.push(msg),
            SenderType::Admin => {}
        }
    }
    (to_resend, to_persist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::chat::MessageId;
    use crate::storage::MemoryStorage;

    fn local(sender: SenderType, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::Pending(format!("tmp-{}", text)),
            conversation_id: None,
            session_id: Some("sess".to_string()),
            sender_id: None,
            sender_type: sender,
            message: text.to_string(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            status: MessageStatus::Local,
            temp_id: Some(format!("tmp-{}", text)),
        }
    }

    #[tokio::test]
    async fn guest_session_is_created_once_and_reused() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStorage::new()));
        let first = resolver.ensure_guest_session().await.unwrap();
        let second = resolver.ensure_guest_session().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn authenticated_user_wins_over_guest() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStorage::new()));
        let identity = resolver.resolve(Some(42), true).await.unwrap();
        assert_eq!(
            identity,
            Identity::User { user_id: 42, conversation_id: None, admin: true }
        );
        assert_eq!(identity.sender_type(), SenderType::Admin);
    }

    #[tokio::test]
    async fn guest_identity_has_session_but_no_conversation() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStorage::new()));
        let identity = resolver.resolve(None, false).await.unwrap();
        assert!(identity.is_guest());
        assert!(identity.session_id().is_some());
        assert!(identity.conversation_id().is_none());
    }

    #[test]
    fn guest_session_id_shape() {
        let id = new_guest_session_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn partition_routes_by_author() {
        let messages = vec![
            local(SenderType::Guest, "question"),
            local(SenderType::Bot, "answer"),
            local(SenderType::Guest, "followup")
        ];
        let (resend, persist) = partition_local_messages(messages);
        assert_eq!(resend.len(), 2);
        assert_eq!(persist.len(), 1);
        assert_eq!(persist[0].message, "answer");
    }

    #[test]
    fn partition_skips_non_local_messages() {
        let mut sent = local(SenderType::Guest, "already-sent");
        sent.status = MessageStatus::Sent;
        let (resend, persist) = partition_local_messages(vec![sent]);
        assert!(resend.is_empty());
        assert!(persist.is_empty());
    }
}
