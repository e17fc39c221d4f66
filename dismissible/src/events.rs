use crate::domain::Item;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEvent {
    Retrieved(ItemRetrievedEvent),
    Created(ItemCreatedEvent),
    Dismissed(ItemDismissedEvent),
    Restored(ItemRestoredEvent),
}

impl ItemEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemEvent::Retrieved(_) => "retrieved",
            ItemEvent::Created(_) => "created",
            ItemEvent::Dismissed(_) => "dismissed",
            ItemEvent::Restored(_) => "restored",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            ItemEvent::Retrieved(e) => &e.user_id,
            ItemEvent::Created(e) => &e.user_id,
            ItemEvent::Dismissed(e) => &e.user_id,
            ItemEvent::Restored(e) => &e.user_id,
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            ItemEvent::Retrieved(e) => &e.item_id,
            ItemEvent::Created(e) => &e.item_id,
            ItemEvent::Dismissed(e) => &e.item_id,
            ItemEvent::Restored(e) => &e.item_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRetrievedEvent {
    pub user_id: String,
    pub item_id: String,
    pub item: Item,
    pub context: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreatedEvent {
    pub user_id: String,
    pub item_id: String,
    pub item: Item,
    pub context: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDismissedEvent {
    pub user_id: String,
    pub item_id: String,
    pub item: Item,
    pub previous_item: Item,
    pub context: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRestoredEvent {
    pub user_id: String,
    pub item_id: String,
    pub item: Item,
    pub previous_item: Item,
    pub context: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
