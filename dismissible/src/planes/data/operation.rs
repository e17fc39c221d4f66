use crate::domain::response::{GetOrCreateResponse, TransitionResponse};
use async_trait::async_trait;
use serde_json::Value;
use shared::Result;

/// Application-level lifecycle operations on dismissible items.
/// `context` is opaque caller data forwarded into the emitted event.
#[async_trait]
pub trait LifecycleOperations: Send + Sync + 'static {
    async fn get_or_create(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<GetOrCreateResponse>;

    async fn get_or_create_many(
        &self,
        user_id: &str,
        item_ids: &[String],
        context: Option<Value>,
    ) -> Result<Vec<GetOrCreateResponse>>;

    async fn dismiss(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<TransitionResponse>;

    async fn restore(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<TransitionResponse>;
}
