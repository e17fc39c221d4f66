//! Storage adapters for the dismissible-items port, plus the factory that picks
//! one from configuration.

pub mod lru_cache;
pub mod sqlite_store;
pub mod timeout;

use async_trait::async_trait;
use dismissible::clock::Clock;
use dismissible::persistence::SledItemStore;
use dismissible::ports::{ItemStore, StoreFactory};
use shared::Result;
use shared::config::StorageConfig;
use std::sync::Arc;

pub use lru_cache::MemoryItemStore;
pub use sqlite_store::SqliteItemStore;
pub use timeout::TimedStore;

/// Builds whichever backend the configuration names. Disk and database
/// backends are wrapped in a [`TimedStore`]; the memory backend gets its
/// optional background sweeper.
#[derive(Debug, Clone)]
pub struct UnifiedStoreFactory {
    clock: Arc<dyn Clock>,
}

impl UnifiedStoreFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl StoreFactory for UnifiedStoreFactory {
    async fn create_from_config(&self, config: &StorageConfig) -> Result<Arc<dyn ItemStore>> {
        match config {
            StorageConfig::Memory {
                max_items,
                ttl,
                sweep_interval,
            } => {
                let store = Arc::new(MemoryItemStore::new(*max_items, *ttl, self.clock.clone()));
                if let Some(every) = sweep_interval {
                    store.spawn_sweeper(*every);
                }

                tracing::info!(
                    "Using memory store (max_items={}, ttl={:?})",
                    store.max_items(),
                    ttl
                );
                Ok(store)
            }
            StorageConfig::Sled { path, timeout } => {
                let store = SledItemStore::open(path)?;
                tracing::info!("Using sled store at {}", path.display());
                Ok(Arc::new(TimedStore::new(store, *timeout)))
            }
            StorageConfig::Sqlite { url, timeout } => {
                let store = SqliteItemStore::connect(url, *timeout).await?;
                Ok(Arc::new(TimedStore::new(store, *timeout)))
            }
        }
    }
}
