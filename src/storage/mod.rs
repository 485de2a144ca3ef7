mod file;
mod memory;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::ChatError;
use crate::models::chat::ChatMessage;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage key for the persisted guest session id.
pub const GUEST_SESSION_KEY: &str = "chat_guest_session_id";
/// Storage key for locally-cached guest messages that never reached the server.
pub const GUEST_MESSAGES_KEY: &str = "chat_guest_messages";

/// Client-local persistent key/value storage, the stand-in for the browser's
/// localStorage. Single-writer per key: the identity resolver owns the session
/// id, the guest send path and the identity resolver own the message cache.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ChatError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ChatError>;
    async fn remove(&self, key: &str) -> Result<(), ChatError>;
}

pub fn create_storage(args: &Args) -> Result<Arc<dyn LocalStorage>, ChatError> {
    match args.storage_type.to_lowercase().as_str() {
        "file" => {
            info!("Guest state will be persisted to: {}", args.storage_path);
            Ok(Arc::new(FileStorage::new(&args.storage_path)))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => Err(ChatError::UnsupportedStorage(other.to_string())),
    }
}

/// Read the cached guest messages, tolerating an absent or corrupt entry.
pub async fn load_local_messages(
    storage: &dyn LocalStorage
) -> Result<Vec<ChatMessage>, ChatError> {
    match storage.get(GUEST_MESSAGES_KEY).await? {
        Some(raw) =>
            Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable guest message cache: {}", e);
                Vec::new()
            })),
        None => Ok(Vec::new()),
    }
}

pub async fn store_local_messages(
    storage: &dyn LocalStorage,
    messages: &[ChatMessage]
) -> Result<(), ChatError> {
    let raw = serde_json::to_string(messages)?;
    storage.set(GUEST_MESSAGES_KEY, &raw).await
}

/// Drop every guest artifact. Called once authentication succeeds.
pub async fn clear_guest_state(storage: &dyn LocalStorage) -> Result<(), ChatError> {
    storage.remove(GUEST_SESSION_KEY).await?;
    storage.remove(GUEST_MESSAGES_KEY).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::chat::{ MessageId, MessageStatus, SenderType };

    fn local_message(text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::Pending("tmp-store".to_string()),
            conversation_id: None,
            session_id: Some("sess-1".to_string()),
            sender_id: None,
            sender_type: SenderType::Guest,
            message: text.to_string(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            status: MessageStatus::Local,
            temp_id: Some("tmp-store".to_string()),
        }
    }

    #[tokio::test]
    async fn round_trips_local_messages() {
        let storage = MemoryStorage::new();
        store_local_messages(&storage, &[local_message("hi")]).await.unwrap();
        let loaded = load_local_messages(&storage).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message, "hi");
        assert_eq!(loaded[0].status, MessageStatus::Local);
    }

    #[tokio::test]
    async fn missing_cache_reads_as_empty() {
        let storage = MemoryStorage::new();
        assert!(load_local_messages(&storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_reads_as_empty() {
        let storage = MemoryStorage::new();
        storage.set(GUEST_MESSAGES_KEY, "{not json").await.unwrap();
        assert!(load_local_messages(&storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_guest_state_removes_both_keys() {
        let storage = MemoryStorage::new();
        storage.set(GUEST_SESSION_KEY, "sess").await.unwrap();
        store_local_messages(&storage, &[local_message("bye")]).await.unwrap();
        clear_guest_state(&storage).await.unwrap();
        assert!(storage.get(GUEST_SESSION_KEY).await.unwrap().is_none());
        assert!(storage.get(GUEST_MESSAGES_KEY).await.unwrap().is_none());
    }
}
