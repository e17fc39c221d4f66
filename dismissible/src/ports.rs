#![deny(clippy::all)]

use crate::domain::Item;
use async_trait::async_trait;
use shared::Result;
use shared::config::StorageConfig;
use std::collections::HashMap;
use std::sync::Arc;

// Ports are the pluggable extension points for the storage backends

/// Port for creating an item store from configuration.
/// The backend is chosen once at startup; callers only ever see the trait.
#[async_trait]
pub trait StoreFactory: Send + Sync + 'static {
    async fn create_from_config(&self, config: &StorageConfig) -> Result<Arc<dyn ItemStore>>;
}

/// Persistence contract shared by every backend.
///
/// Keys are `(user_id, item_id)`. Implementations hand out owned copies; the
/// canonical version always stays inside the backend.
#[async_trait]
pub trait ItemStore: Send + Sync + 'static {
    /// Pure lookup, never creates.
    async fn get(&self, user_id: &str, item_id: &str) -> Result<Option<Item>>;

    /// Lookup of several items for one user. Missing ids are omitted, not errors.
    async fn get_many(&self, user_id: &str, item_ids: &[String]) -> Result<HashMap<String, Item>>;

    /// Insert a new item. Fails with `Conflict` when the key exists, unless the
    /// backend documents a relaxation.
    async fn create(&self, item: Item) -> Result<Item>;

    /// Insert a batch. Either the whole batch is stored or one error is returned.
    async fn create_many(&self, items: Vec<Item>) -> Result<Vec<Item>>;

    /// Replace the mutable part (`dismissed_at`) of an existing item.
    /// Missing keys either fail with `NotFound` or upsert, per backend.
    async fn update(&self, item: Item) -> Result<Item>;

    /// Remove one item. Deleting a missing key is not an error.
    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()>;

    /// Remove everything. Administrative and test resets only.
    async fn delete_all(&self) -> Result<()>;
}
