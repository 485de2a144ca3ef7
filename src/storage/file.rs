use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::ChatError;
use crate::storage::LocalStorage;

/// File-backed storage: one JSON object per file, rewritten on every change.
/// The payload is a handful of small keys, wholesale rewrite keeps the file
/// consistent without any locking beyond the in-process mutex.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: &str) -> Self {
        Self { path: PathBuf::from(path), lock: Mutex::new(()) }
    }

    fn read_map(&self) -> Result<HashMap<String, String>, ChatError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ChatError::Io(e)),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }
}

#[async_trait]
impl LocalStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, ChatError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    async fn remove(&self, key: &str) -> Result<(), ChatError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let path_str = path.to_str().unwrap();

        let storage = FileStorage::new(path_str);
        storage.set("chat_guest_session_id", "1700000000000-abcd").await.unwrap();
        drop(storage);

        let reopened = FileStorage::new(path_str);
        assert_eq!(
            reopened.get("chat_guest_session_id").await.unwrap().as_deref(),
            Some("1700000000000-abcd")
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let storage = FileStorage::new(path.to_str().unwrap());
        storage.remove("never-set").await.unwrap();
        storage.set("k", "v").await.unwrap();
        storage.remove("k").await.unwrap();
        storage.remove("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
    }
}
