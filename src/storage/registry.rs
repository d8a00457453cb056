use super::{ObjectStorage, Result, Storage, StorageError};
use crate::config::StorageConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Named storages built once at startup and shared by every task
#[derive(Clone, Default)]
pub struct StorageRegistry {
    storages: HashMap<String, Arc<dyn Storage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &HashMap<String, StorageConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for (name, config) in configs {
            registry.insert(Arc::new(ObjectStorage::from_config(name, config)?));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, storage: Arc<dyn Storage>) {
        self.storages.insert(storage.name().to_string(), storage);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Storage>> {
        self.storages
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("storage '{name}'")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.storages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
