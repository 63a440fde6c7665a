//! Storage factory for creating backend instances
//!
//! Provides a flexible way to instantiate storage backends without
//! exposing implementation details to consumers.

use std::str::FromStr;
use std::sync::Arc;

use followgraph_types::StoreError;

use crate::memory::MemoryBackend;
use crate::outbox::{MemoryOutbox, ReconciliationStore};
use crate::AccountStore;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory storage (for testing and development)
    Memory,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            _ => Err(StoreError::Internal(format!("Unknown backend type: {}", s))),
        }
    }
}

impl BackendType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
        }
    }
}

/// Configuration for storage backend
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend type to use
    pub backend: BackendType,
    /// Optional connection string (for database backends)
    pub connection_string: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: BackendType::Memory, connection_string: None }
    }
}

impl StorageConfig {
    /// Create config for memory backend
    pub fn memory() -> Self {
        Self::default()
    }
}

/// Factory for creating storage backend instances
pub struct StorageFactory;

impl StorageFactory {
    /// Create an account store from configuration
    pub fn create_account_store(config: &StorageConfig) -> Arc<dyn AccountStore> {
        match config.backend {
            BackendType::Memory => Arc::new(MemoryBackend::new()),
        }
    }

    /// Create a reconciliation outbox from configuration
    pub fn create_outbox(config: &StorageConfig) -> Arc<dyn ReconciliationStore> {
        match config.backend {
            BackendType::Memory => Arc::new(MemoryOutbox::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_type_from_str() {
        assert_eq!(BackendType::from_str("memory").unwrap(), BackendType::Memory);
        assert_eq!(BackendType::from_str("MEMORY").unwrap(), BackendType::Memory);
        assert!(BackendType::from_str("postgres").is_err());
    }

    #[test]
    fn backend_type_round_trip() {
        let backend = BackendType::Memory;
        assert_eq!(BackendType::from_str(backend.as_str()).unwrap(), backend);
    }

    #[tokio::test]
    async fn factory_creates_memory_backend() {
        let config = StorageConfig::memory();
        let store = StorageFactory::create_account_store(&config);
        assert!(store.list_account_ids().await.unwrap().is_empty());

        let outbox = StorageFactory::create_outbox(&config);
        assert_eq!(outbox.len().await.unwrap(), 0);
    }
}
