use dismissible::clock::Clock;
use dismissible::events::ItemEvent;
use dismissible::planes::control::AdminService;
use dismissible::planes::data::LifecycleService;
use dismissible::ports::{ItemStore, StoreFactory};
use shared::config::Config;
use std::sync::Arc;
use storage_engine::UnifiedStoreFactory;
use tokio::sync::broadcast;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleService>,
    pub admin: Arc<AdminService>,
    pub event_channel: broadcast::Sender<ItemEvent>,
}

impl AppState {
    pub fn new(store: Arc<dyn ItemStore>, clock: Arc<dyn Clock>, event_buffer: usize) -> Self {
        // Broadcast channel feeding the SSE endpoint
        let (event_tx, _event_rx) = broadcast::channel(event_buffer.max(1));

        let lifecycle = Arc::new(LifecycleService::with_event_broadcaster(
            store.clone(),
            clock,
            event_tx.clone(),
        ));
        let admin = Arc::new(AdminService::new(store));

        Self {
            lifecycle,
            admin,
            event_channel: event_tx,
        }
    }

    /// Build the configured backend and wire the services on top of it.
    pub async fn from_config(config: &Config, clock: Arc<dyn Clock>) -> shared::Result<Self> {
        let factory = UnifiedStoreFactory::new(clock.clone());
        let store = factory.create_from_config(&config.storage).await?;

        tracing::info!("Storage backend '{}' initialized", config.storage.name());
        Ok(Self::new(store, clock, config.event_buffer))
    }
}
