use async_trait::async_trait;

use shared::Result;

/// Administrative operations outside the ordinary item lifecycle.
#[async_trait]
pub trait AdminOperations: Send + Sync + 'static {
    async fn delete_item(&self, user_id: &str, item_id: &str) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}
