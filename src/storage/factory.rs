//! Storage factory for creating storage instances

use std::sync::Arc;
use tracing::info;

use super::backends::{FileBackend, MemoryBackend};
use super::config::{BackendType, StorageConfig};
use super::error::StorageResult;
use super::traits::DocumentStore;

/// Factory for creating storage instances
pub struct StorageFactory;

impl StorageFactory {
    /// Create storage from explicit configuration
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn DocumentStore>> {
        match &config.backend {
            BackendType::File => {
                let backend = FileBackend::new(config).await?;
                info!(base_dir = %backend.base_dir().display(), "using file storage");
                Ok(Arc::new(backend))
            }
            BackendType::Memory => {
                info!("using in-memory storage");
                Ok(Arc::new(MemoryBackend::new()))
            }
        }
    }

    /// Create a test storage instance (memory backend)
    pub fn create_test_storage() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryBackend::new())
    }
}
