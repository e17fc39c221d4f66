use crate::clock::Clock;
use crate::domain::response::{GetOrCreateResponse, TransitionResponse};
use crate::domain::{Item, ItemFactory, validate_identity};
use crate::events::{
    ItemCreatedEvent, ItemDismissedEvent, ItemEvent, ItemRestoredEvent, ItemRetrievedEvent,
};
use crate::planes::data::operation::LifecycleOperations;
use crate::ports::ItemStore;
use async_trait::async_trait;
use serde_json::Value;
use shared::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Application service enforcing the item state machine:
/// absent -> active (get-or-create), active <-> dismissed (dismiss / restore).
///
/// Every transition reads through the store, derives the next version with
/// [`ItemFactory`], writes it back and then publishes an [`ItemEvent`].
/// Publishing is fire-and-forget; a missing subscriber never fails the call.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    event_broadcaster: Option<broadcast::Sender<ItemEvent>>,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn ItemStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            event_broadcaster: None,
        }
    }

    pub fn with_event_broadcaster(
        store: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
        broadcaster: broadcast::Sender<ItemEvent>,
    ) -> Self {
        Self {
            store,
            clock,
            event_broadcaster: Some(broadcaster),
        }
    }

    fn check_identity(user_id: &str, item_id: &str) -> Result<()> {
        validate_identity("userId", user_id)?;
        validate_identity("itemId", item_id)
    }

    /// Current version of an existing item, or `ItemNotFound`.
    async fn load_existing(&self, user_id: &str, item_id: &str) -> Result<Item> {
        self.store
            .get(user_id, item_id)
            .await?
            .ok_or_else(|| Error::item_not_found(user_id, item_id))
    }

    fn retrieved(&self, item: &Item, context: Option<Value>) -> ItemEvent {
        ItemEvent::Retrieved(ItemRetrievedEvent {
            user_id: item.user_id().to_string(),
            item_id: item.id().to_string(),
            item: item.clone(),
            context,
            timestamp: self.clock.now(),
        })
    }

    fn created(&self, item: &Item, context: Option<Value>) -> ItemEvent {
        ItemEvent::Created(ItemCreatedEvent {
            user_id: item.user_id().to_string(),
            item_id: item.id().to_string(),
            item: item.clone(),
            context,
            timestamp: self.clock.now(),
        })
    }

    /// Insert a fresh item. If another writer inserted the key first, return
    /// the stored item instead, flagged as not created.
    async fn insert_or_reread(&self, item: Item) -> Result<(Item, bool)> {
        let user_id = item.user_id().to_string();
        let item_id = item.id().to_string();

        match self.store.create(item).await {
            Ok(created) => Ok((created, true)),
            Err(Error::Conflict(reason)) => {
                tracing::debug!(
                    "Lost create race for item '{}' of user '{}': {}",
                    item_id,
                    user_id,
                    reason
                );
                let existing = self
                    .store
                    .get(&user_id, &item_id)
                    .await?
                    .ok_or(Error::Conflict(reason))?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    fn publish(&self, event: ItemEvent) {
        let Some(ref broadcaster) = self.event_broadcaster else {
            return;
        };

        let kind = event.kind();
        let user_id = event.user_id().to_string();
        let item_id = event.item_id().to_string();

        match broadcaster.send(event) {
            Ok(subscriber_count) => {
                tracing::debug!(
                    "Broadcasted {} event for item '{}' of user '{}' to {} subscriber(s)",
                    kind,
                    item_id,
                    user_id,
                    subscriber_count
                );
            }
            Err(_) => {
                tracing::warn!(
                    "No subscribers for {} event on item '{}' of user '{}'",
                    kind,
                    item_id,
                    user_id
                );
            }
        }
    }
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("clock", &self.clock)
            .field("events", &self.event_broadcaster.is_some())
            .finish()
    }
}

#[async_trait]
impl LifecycleOperations for LifecycleService {
    async fn get_or_create(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<GetOrCreateResponse> {
        Self::check_identity(user_id, item_id)?;

        if let Some(existing) = self.store.get(user_id, item_id).await? {
            tracing::debug!("Retrieved item '{}' for user '{}'", item_id, user_id);
            self.publish(self.retrieved(&existing, context));
            return Ok(GetOrCreateResponse::new(existing, false));
        }

        let item = ItemFactory::create(item_id, user_id, self.clock.now(), None)?;

        let (item, created) = self.insert_or_reread(item).await?;
        if created {
            tracing::info!("Created item '{}' for user '{}'", item_id, user_id);
            self.publish(self.created(&item, context));
        } else {
            self.publish(self.retrieved(&item, context));
        }
        Ok(GetOrCreateResponse::new(item, created))
    }

    async fn get_or_create_many(
        &self,
        user_id: &str,
        item_ids: &[String],
        context: Option<Value>,
    ) -> Result<Vec<GetOrCreateResponse>> {
        validate_identity("userId", user_id)?;

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            validate_identity("itemId", item_id)?;
            if seen.insert(item_id.as_str()) {
                unique.push(item_id.clone());
            }
        }

        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.store.get_many(user_id, &unique).await?;

        let now = self.clock.now();
        let missing = unique
            .iter()
            .filter(|id| !found.contains_key(id.as_str()))
            .map(|id| ItemFactory::create(id.as_str(), user_id, now, None))
            .collect::<Result<Vec<_>>>()?;

        let created: HashMap<String, (Item, bool)> = if missing.is_empty() {
            HashMap::new()
        } else {
            match self.store.create_many(missing.clone()).await {
                Ok(items) => items
                    .into_iter()
                    .map(|item| (item.id().to_string(), (item, true)))
                    .collect(),
                // A concurrent writer inserted one of the ids; the batch was
                // rejected as a whole, so settle each id on its own.
                Err(Error::Conflict(reason)) => {
                    tracing::debug!(
                        "Batch create for user '{}' conflicted, retrying per item: {}",
                        user_id,
                        reason
                    );
                    let mut settled = HashMap::with_capacity(missing.len());
                    for item in missing {
                        let (item, was_created) = self.insert_or_reread(item).await?;
                        settled.insert(item.id().to_string(), (item, was_created));
                    }
                    settled
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            "Batch get-or-create for user '{}': {} retrieved, {} created",
            user_id,
            found.len(),
            created.values().filter(|(_, was_created)| *was_created).count()
        );

        let mut responses = Vec::with_capacity(unique.len());
        for item_id in &unique {
            if let Some(item) = found.get(item_id) {
                self.publish(self.retrieved(item, context.clone()));
                responses.push(GetOrCreateResponse::new(item.clone(), false));
            } else if let Some((item, was_created)) = created.get(item_id) {
                if *was_created {
                    self.publish(self.created(item, context.clone()));
                } else {
                    self.publish(self.retrieved(item, context.clone()));
                }
                responses.push(GetOrCreateResponse::new(item.clone(), *was_created));
            } else {
                return Err(Error::Internal(format!(
                    "batch create did not return item '{}'",
                    item_id
                )));
            }
        }

        Ok(responses)
    }

    async fn dismiss(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<TransitionResponse> {
        Self::check_identity(user_id, item_id)?;

        let current = self.load_existing(user_id, item_id).await?;
        if current.is_dismissed() {
            return Err(Error::ItemAlreadyDismissed {
                user_id: user_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let next = ItemFactory::mark_dismissed(&current, self.clock.now())?;
        let stored = self.store.update(next).await?;

        tracing::info!("Dismissed item '{}' for user '{}'", item_id, user_id);
        self.publish(ItemEvent::Dismissed(ItemDismissedEvent {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            item: stored.clone(),
            previous_item: current.clone(),
            context,
            timestamp: self.clock.now(),
        }));

        Ok(TransitionResponse::new(stored, current))
    }

    async fn restore(
        &self,
        user_id: &str,
        item_id: &str,
        context: Option<Value>,
    ) -> Result<TransitionResponse> {
        Self::check_identity(user_id, item_id)?;

        let current = self.load_existing(user_id, item_id).await?;
        if !current.is_dismissed() {
            return Err(Error::ItemNotDismissed {
                user_id: user_id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        let next = ItemFactory::mark_restored(&current);
        let stored = self.store.update(next).await?;

        tracing::info!("Restored item '{}' for user '{}'", item_id, user_id);
        self.publish(ItemEvent::Restored(ItemRestoredEvent {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            item: stored.clone(),
            previous_item: current.clone(),
            context,
            timestamp: self.clock.now(),
        }));

        Ok(TransitionResponse::new(stored, current))
    }
}
