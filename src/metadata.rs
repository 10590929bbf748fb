//! Metadata key-value store (Component B).
//!
//! A key→record map from canonical stream URL to [`StreamMetadata`].
//! The engine never touches this directly — only [`crate::store::StreamStore`]
//! does, per the spec's "single-writer atomic put" contract.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{StreamMetadata, StreamUrl};

/// Errors from the metadata layer. Anything here becomes
/// [`crate::error::ErrorKind::Internal`] at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metadata io failure: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "file-storage")]
    #[error("metadata database failure: {0}")]
    Heed(#[from] heed::Error),
}

/// Metadata KV contract (spec §6 "Consumed interfaces").
pub trait MetadataStore: Send + Sync {
    fn get(&self, url: &str) -> Result<Option<StreamMetadata>, MetadataError>;
    fn put(&self, url: &str, record: &StreamMetadata) -> Result<(), MetadataError>;
    fn delete(&self, url: &str) -> Result<bool, MetadataError>;
    fn close(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}

/// Default in-process implementation: a `RwLock<HashMap<..>>`. Durable
/// only for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<StreamUrl, StreamMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, url: &str) -> Result<Option<StreamMetadata>, MetadataError> {
        Ok(self.records.read().get(url).cloned())
    }

    fn put(&self, url: &str, record: &StreamMetadata) -> Result<(), MetadataError> {
        self.records.write().insert(url.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, url: &str) -> Result<bool, MetadataError> {
        Ok(self.records.write().remove(url).is_some())
    }
}

/// LMDB-backed (`heed`) metadata store: crash-safe, durable across
/// restarts. Every `put` is a transactional write committed before
/// returning, giving the atomicity the spec's contract requires without
/// hand-rolling `rename()`+fsync bookkeeping.
#[cfg(feature = "file-storage")]
pub mod file_backed {
    use super::*;
    use heed::types::{SerdeJson, Str};
    use heed::{Database, Env, EnvOpenOptions};
    use std::path::Path;

    pub struct FileMetadataStore {
        env: Env,
        db: Database<Str, SerdeJson<StreamMetadata>>,
    }

    impl FileMetadataStore {
        pub fn open(dir: impl AsRef<Path>) -> Result<Arc<Self>, MetadataError> {
            let dir = dir.as_ref();
            std::fs::create_dir_all(dir)?;

            // SAFETY: caller guarantees exclusive access to `dir` for the
            // lifetime of this store, as required by heed's memory map.
            let env = unsafe {
                EnvOpenOptions::new()
                    .map_size(1024 * 1024 * 1024)
                    .open(dir)?
            };
            let mut wtxn = env.write_txn()?;
            let db = env.create_database(&mut wtxn, Some("metadata"))?;
            wtxn.commit()?;

            Ok(Arc::new(Self { env, db }))
        }
    }

    impl MetadataStore for FileMetadataStore {
        fn get(&self, url: &str) -> Result<Option<StreamMetadata>, MetadataError> {
            let rtxn = self.env.read_txn()?;
            Ok(self.db.get(&rtxn, url)?)
        }

        fn put(&self, url: &str, record: &StreamMetadata) -> Result<(), MetadataError> {
            let mut wtxn = self.env.write_txn()?;
            self.db.put(&mut wtxn, url, record)?;
            wtxn.commit()?;
            Ok(())
        }

        fn delete(&self, url: &str) -> Result<bool, MetadataError> {
            let mut wtxn = self.env.write_txn()?;
            let existed = self.db.delete(&mut wtxn, url)?;
            wtxn.commit()?;
            Ok(existed)
        }

        fn close(&self) -> Result<(), MetadataError> {
            Ok(())
        }
    }
}

#[cfg(feature = "file-storage")]
pub use file_backed::FileMetadataStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamMetadata;

    #[test]
    fn in_memory_put_get_delete() {
        let store = InMemoryMetadataStore::new();
        let record = StreamMetadata::new(Some("text/plain".into()), None, None);

        assert!(store.get("/a").unwrap().is_none());
        store.put("/a", &record).unwrap();
        assert_eq!(store.get("/a").unwrap().unwrap().id, record.id);
        assert!(store.delete("/a").unwrap());
        assert!(!store.delete("/a").unwrap());
        assert!(store.get("/a").unwrap().is_none());
    }

    #[cfg(feature = "file-storage")]
    #[test]
    fn file_backed_roundtrip_and_survives_reopen() {
        use file_backed::FileMetadataStore;

        let dir = tempfile::tempdir().unwrap();
        let record = StreamMetadata::new(Some("application/json".into()), Some(60), None);

        {
            let store = FileMetadataStore::open(dir.path()).unwrap();
            store.put("/stream/a", &record).unwrap();
        }

        let reopened = FileMetadataStore::open(dir.path()).unwrap();
        let fetched = reopened.get("/stream/a").unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.ttl_seconds, Some(60));
    }
}
