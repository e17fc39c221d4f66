use crate::domain::validate_identity;
use crate::planes::control::operation::AdminOperations;
use crate::ports::ItemStore;
use async_trait::async_trait;
use shared::Result;
use std::sync::Arc;

/// Control-plane service: hard deletes and full resets of the backing store.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn ItemStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for AdminService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminService")
            .field("store", &"<dyn ItemStore>")
            .finish()
    }
}

#[async_trait]
impl AdminOperations for AdminService {
    async fn delete_item(&self, user_id: &str, item_id: &str) -> Result<()> {
        validate_identity("userId", user_id)?;
        validate_identity("itemId", item_id)?;

        self.store.delete(user_id, item_id).await?;
        tracing::info!("Deleted item '{}' for user '{}'", item_id, user_id);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.store.delete_all().await?;
        tracing::warn!("All dismissible items were deleted");
        Ok(())
    }
}
