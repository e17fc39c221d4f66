use async_trait::async_trait;
use dismissible::domain::Item;
use dismissible::ports::ItemStore;
use shared::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Bounds every call on a remote or disk-backed store. A call that does not
/// finish within `timeout` fails with [`Error::Timeout`].
///
/// The deadline is only observed when the wrapped future yields. Blocking work
/// done between await points (sled's in-memory tree operations) runs to
/// completion first, so for sled the bound effectively covers `flush_async`.
#[derive(Debug, Clone)]
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ItemStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Store {} timed out after {:?}", operation, self.timeout);
                Err(Error::Timeout(format!(
                    "{} did not complete within {}ms",
                    operation,
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl<S: ItemStore> ItemStore for TimedStore<S> {
    async fn get(&self, user_id: &str, item_id: &str) -> Result<Option<Item>> {
        self.bounded("get", self.inner.get(user_id, item_id)).await
    }

    async fn get_many(&self, user_id: &str, item_ids: &[String]) -> Result<HashMap<String, Item>> {
        self.bounded("get_many", self.inner.get_many(user_id, item_ids))
            .await
    }

    async fn create(&self, item: Item) -> Result<Item> {
        self.bounded("create", self.inner.create(item)).await
    }

    async fn create_many(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        self.bounded("create_many", self.inner.create_many(items))
            .await
    }

    async fn update(&self, item: Item) -> Result<Item> {
        self.bounded("update", self.inner.update(item)).await
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        self.bounded("delete", self.inner.delete(user_id, item_id))
            .await
    }

    async fn delete_all(&self) -> Result<()> {
        self.bounded("delete_all", self.inner.delete_all()).await
    }
}
