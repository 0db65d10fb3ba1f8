//! Local snapshot cache.
//!
//! Before each write the gateway drops a copy of the outgoing payload here,
//! so a client whose write failed still holds the last local version after a
//! restart. One JSON file per document under the cache directory. Cache
//! failures are logged by the caller and never block a save.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

use board_model::{DocumentData, DocumentId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// One cached outgoing payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub data: DocumentData,
    /// When the snapshot was taken, in milliseconds since the Unix epoch.
    pub saved_at: f64,
}

/// Where snapshots go. Synchronous on purpose; payloads are small and the
/// gateway writes them from its own worker task.
pub trait SnapshotCache: Send + Sync {
    fn load(&self, id: DocumentId) -> Result<Option<CachedSnapshot>>;
    fn store(&self, id: DocumentId, snapshot: &CachedSnapshot) -> Result<()>;
    fn clear(&self, id: DocumentId) -> Result<()>;
}

/// Snapshot cache backed by one file per document.
pub struct FileSnapshotCache {
    dir: PathBuf,
}

impl FileSnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: DocumentId) -> PathBuf {
        self.dir.join(format!("board-{id}.json"))
    }
}

impl SnapshotCache for FileSnapshotCache {
    fn load(&self, id: DocumentId) -> Result<Option<CachedSnapshot>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let snapshot: CachedSnapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    fn store(&self, id: DocumentId, snapshot: &CachedSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.path_for(id), contents)?;
        Ok(())
    }

    fn clear(&self, id: DocumentId) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Map-backed cache for tests and ephemeral embedding.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    snapshots: RwLock<HashMap<DocumentId, CachedSnapshot>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotCache for InMemoryCache {
    fn load(&self, id: DocumentId) -> Result<Option<CachedSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    fn store(&self, id: DocumentId, snapshot: &CachedSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, snapshot.clone());
        Ok(())
    }

    fn clear(&self, id: DocumentId) -> Result<()> {
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        Ok(())
    }
}

// ==================== Snapshot cache tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use board_model::{Node, NodeId};
    use tempfile::TempDir;

    fn snapshot(title: &str) -> CachedSnapshot {
        CachedSnapshot {
            data: DocumentData {
                nodes: Some(vec![Node {
                    id: NodeId::from(1),
                    title: title.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            saved_at: 1000.0,
        }
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(temp_dir.path());
        let id = DocumentId::new();

        cache.store(id, &snapshot("draft")).unwrap();
        let loaded = cache.load(id).unwrap().unwrap();
        assert_eq!(loaded, snapshot("draft"));
    }

    #[test]
    fn test_documents_are_namespaced() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(temp_dir.path());
        let a = DocumentId::new();
        let b = DocumentId::new();

        cache.store(a, &snapshot("a")).unwrap();
        cache.store(b, &snapshot("b")).unwrap();

        assert_eq!(cache.load(a).unwrap().unwrap(), snapshot("a"));
        assert_eq!(cache.load(b).unwrap().unwrap(), snapshot("b"));
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(temp_dir.path());
        assert!(cache.load(DocumentId::new()).unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(temp_dir.path());
        let id = DocumentId::new();

        cache.store(id, &snapshot("gone")).unwrap();
        cache.clear(id).unwrap();
        assert!(cache.load(id).unwrap().is_none());

        // Clearing again is fine.
        cache.clear(id).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileSnapshotCache::new(temp_dir.path());
        let id = DocumentId::new();

        fs::create_dir_all(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join(format!("board-{id}.json")), "not json").unwrap();

        assert!(matches!(cache.load(id), Err(CacheError::Serde(_))));
    }

    #[test]
    fn test_in_memory_cache() {
        let cache = InMemoryCache::new();
        let id = DocumentId::new();

        assert!(cache.load(id).unwrap().is_none());
        cache.store(id, &snapshot("mem")).unwrap();
        assert_eq!(cache.load(id).unwrap().unwrap(), snapshot("mem"));
        cache.clear(id).unwrap();
        assert!(cache.load(id).unwrap().is_none());
    }
}
