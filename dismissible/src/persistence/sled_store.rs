use crate::domain::{Item, ItemFactory, storage_key};
use crate::ports::ItemStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Error, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::HashMap;
use std::path::Path;

const ITEMS_TREE: &str = "items";

/// On-disk record. Decoupled from [`Item`] so rows are re-validated through
/// the factory when they are read back.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredItem {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    dismissed_at: Option<DateTime<Utc>>,
}

impl From<&Item> for StoredItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id().to_string(),
            user_id: item.user_id().to_string(),
            created_at: item.created_at(),
            dismissed_at: item.dismissed_at(),
        }
    }
}

impl StoredItem {
    fn into_item(self) -> Result<Item> {
        ItemFactory::create(self.id, self.user_id, self.created_at, self.dismissed_at)
    }
}

fn storage_err(context: &str, e: sled::Error) -> Error {
    Error::Unavailable(format!("{}: {}", context, e))
}

fn encode(item: &Item) -> Result<Vec<u8>> {
    serde_json::to_vec(&StoredItem::from(item))
        .map_err(|e| Error::Internal(format!("Failed to serialize item: {}", e)))
}

fn decode(bytes: &[u8]) -> Result<Item> {
    serde_json::from_slice::<StoredItem>(bytes)
        .map_err(|e| Error::Internal(format!("Failed to deserialize item: {}", e)))?
        .into_item()
}

/// Durable key-value backend on an embedded sled database.
///
/// `create` is a compare-and-swap against an empty slot, so duplicates fail with
/// `Conflict`. `update` on a missing key fails with `NotFound` and never touches
/// the stored `createdAt`.
/// `create_many` runs in one sled transaction.
#[derive(Clone)]
pub struct SledItemStore {
    db: sled::Db,
    items: sled::Tree,
}

impl SledItemStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Unavailable(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path).map_err(|e| storage_err("Failed to open Sled database", e))?;
        let items = db
            .open_tree(ITEMS_TREE)
            .map_err(|e| storage_err("Failed to open items tree", e))?;

        Ok(Self { db, items })
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| storage_err("Failed to flush database", e))?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for SledItemStore {
    async fn get(&self, user_id: &str, item_id: &str) -> Result<Option<Item>> {
        let key = storage_key(user_id, item_id);
        match self
            .items
            .get(key.as_bytes())
            .map_err(|e| storage_err("Failed to get item", e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, user_id: &str, item_ids: &[String]) -> Result<HashMap<String, Item>> {
        let mut found = HashMap::new();

        for item_id in item_ids {
            if let Some(item) = self.get(user_id, item_id).await? {
                found.insert(item_id.clone(), item);
            }
        }

        Ok(found)
    }

    async fn create(&self, item: Item) -> Result<Item> {
        let key = item.storage_key();
        let value = encode(&item)?;

        self.items
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(|e| storage_err("Failed to create item", e))?
            .map_err(|_| Error::Conflict(format!("item '{}' already exists", key)))?;

        self.flush().await?;
        Ok(item)
    }

    async fn create_many(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        if items.is_empty() {
            return Ok(items);
        }

        let entries = items
            .iter()
            .map(|item| Ok((item.storage_key(), encode(item)?)))
            .collect::<Result<Vec<(String, Vec<u8>)>>>()?;

        let outcome = self.items.transaction(|tx| {
            for (key, value) in &entries {
                if tx.get(key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(key.clone()));
                }
                tx.insert(key.as_bytes(), value.as_slice())?;
            }
            Ok(())
        });

        match outcome {
            Ok(()) => {}
            Err(TransactionError::Abort(key)) => {
                return Err(Error::Conflict(format!(
                    "batch rejected: item '{}' already exists",
                    key
                )));
            }
            Err(TransactionError::Storage(e)) => {
                return Err(storage_err("Failed to create items", e));
            }
        }

        self.flush().await?;
        Ok(items)
    }

    async fn update(&self, item: Item) -> Result<Item> {
        let key = item.storage_key();

        // Existence check and write in one transaction so a concurrent delete
        // cannot be undone. Only `dismissedAt` is taken from the caller.
        let outcome = self.items.transaction(|tx| {
            let stored = match tx.get(key.as_bytes())? {
                Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => return Err(ConflictableTransactionError::Abort(Error::NotFound)),
            };

            let merged = ItemFactory::create(
                stored.id(),
                stored.user_id(),
                stored.created_at(),
                item.dismissed_at(),
            )
            .map_err(ConflictableTransactionError::Abort)?;

            let value = encode(&merged).map_err(ConflictableTransactionError::Abort)?;
            tx.insert(key.as_bytes(), value)?;
            Ok(merged)
        });

        let merged = match outcome {
            Ok(merged) => merged,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => {
                return Err(storage_err("Failed to update item", e));
            }
        };

        self.flush().await?;
        Ok(merged)
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        let key = storage_key(user_id, item_id);
        self.items
            .remove(key.as_bytes())
            .map_err(|e| storage_err("Failed to delete item", e))?;

        self.flush().await
    }

    async fn delete_all(&self) -> Result<()> {
        self.items
            .clear()
            .map_err(|e| storage_err("Failed to clear items", e))?;

        self.flush().await
    }
}

impl std::fmt::Debug for SledItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledItemStore")
            .field("items", &self.items.len())
            .finish()
    }
}
