use dashmap::DashMap;
use funeral_flow::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore, StorageError};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ServiceConfig;

/// Where session stores live
#[derive(Debug, Clone)]
pub enum ProfileBackend {
    Memory,
    Directory(PathBuf),
}

/// Hands out one key-value store per booking session, the server-side
/// counterpart of a browser profile.
pub struct Profiles {
    backend: ProfileBackend,
    quota: Option<usize>,
    memory: DashMap<String, InMemoryKeyValueStore>,
}

impl Profiles {
    pub fn new(backend: ProfileBackend, quota: Option<usize>) -> Self {
        Self {
            backend,
            quota,
            memory: DashMap::new(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let backend = match &config.data_dir {
            Some(dir) => ProfileBackend::Directory(dir.clone()),
            None => ProfileBackend::Memory,
        };
        Self::new(backend, config.store_quota)
    }

    pub fn backend(&self) -> &ProfileBackend {
        &self.backend
    }

    /// Release the in-memory store of `session_id`. Directory stores stay on
    /// disk so the draft survives for a later re-open.
    pub fn close(&self, session_id: &str) -> bool {
        self.memory.remove(session_id).is_some()
    }

    /// Number of in-memory stores currently held
    pub fn held(&self) -> usize {
        self.memory.len()
    }

    /// Open (creating if needed) the store of `session_id`. Callers must pass
    /// a validated id, it becomes a directory name.
    pub fn open(&self, session_id: &str) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        match &self.backend {
            ProfileBackend::Memory => {
                let store = self
                    .memory
                    .entry(session_id.to_string())
                    .or_insert_with(|| match self.quota {
                        Some(quota) => InMemoryKeyValueStore::with_quota(quota),
                        None => InMemoryKeyValueStore::new(),
                    })
                    .clone();
                Ok(Arc::new(store))
            }
            ProfileBackend::Directory(root) => {
                let store = FileKeyValueStore::open(root.join(session_id))?;
                let store = match self.quota {
                    Some(quota) => store.with_quota(quota),
                    None => store,
                };
                Ok(Arc::new(store))
            }
        }
    }
}
