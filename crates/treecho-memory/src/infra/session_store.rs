//! Session Storage Implementations
//!
//! Storage backends for persisted session documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Trait for session document storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the document of a session, `None` if it was never saved
    async fn load(&self, id: &Uuid) -> Result<Option<Value>, StoreError>;

    /// Persist the document of a session, replacing any previous one
    async fn save(&self, id: &Uuid, document: &Value) -> Result<(), StoreError>;

    /// Remove a session's document
    async fn delete(&self, id: &Uuid) -> Result<(), StoreError>;

    /// Sessions with a persisted document
    async fn list(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Errors from session store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session document not found: {0}")]
    NotFound(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// File-backed store writing one JSON document per session.
///
/// Saves go to a temporary file that is renamed over the target, so a crash
/// mid-write leaves the previous document intact. Writes are serialized by a
/// store-wide lock.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create a store rooted at `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of a session's document
    pub fn document_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, id: &Uuid) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded session document");
        Ok(Some(document))
    }

    async fn save(&self, id: &Uuid, document: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(document)?;
        let path = self.document_path(id);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Saved session document");
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.document_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// In-memory storage implementation
#[derive(Default)]
pub struct InMemorySessionStore {
    documents: DashMap<Uuid, Value>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.get(id).map(|d| d.clone()))
    }

    async fn save(&self, id: &Uuid, document: &Value) -> Result<(), StoreError> {
        self.documents.insert(*id, document.clone());
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        self.documents
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.documents.iter().map(|e| *e.key()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        let id = Uuid::new_v4();
        let doc = json!({"tree": {"key": "root"}, "patterns": {}});

        assert!(store.load(&id).await.unwrap().is_none());

        store.save(&id, &doc).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(doc));
        assert_eq!(store.list().await.unwrap(), vec![id]);
        assert!(!store.document_path(&id).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = Uuid::new_v4();

        store.save(&id, &json!({"version": 1})).await.unwrap();
        store.save(&id, &json!({"version": 2})).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded["version"], 2);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = Uuid::new_v4();
        std::fs::write(store.document_path(&id), "{not json").unwrap();

        let result = store.load(&id).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_file_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = Uuid::new_v4();

        store.save(&id, &json!({})).await.unwrap();
        store.delete(&id).await.unwrap();

        assert!(store.load(&id).await.unwrap().is_none());
        assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySessionStore::new();
        let id = Uuid::new_v4();

        store.save(&id, &json!({"a": 1})).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
    }
}
