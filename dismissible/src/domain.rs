use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{Error, Result};

/// Longest accepted `userId` / `itemId`.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Separator used by backends that flatten `(userId, itemId)` into one key.
/// It can never appear inside a valid identity.
pub const KEY_SEPARATOR: char = ':';

/// Checks one half of an item identity: 1-64 chars of `[A-Za-z0-9_-]`.
pub fn validate_identity(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", field)));
    }

    if value.len() > MAX_IDENTITY_LEN {
        return Err(Error::InvalidArgument(format!(
            "{} must be at most {} characters",
            field, MAX_IDENTITY_LEN
        )));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidArgument(format!(
            "{} must contain only letters, digits, hyphens or underscores",
            field
        )));
    }

    Ok(())
}

/// Flat storage key for `(userId, itemId)`.
pub fn storage_key(user_id: &str, item_id: &str) -> String {
    format!("{}{}{}", user_id, KEY_SEPARATOR, item_id)
}

/// One version of a dismissible item.
///
/// Fields are private: every value is produced by [`ItemFactory`], so an `Item`
/// in hand always has a valid identity and `dismissed_at >= created_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    dismissed_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dismissed_at(&self) -> Option<DateTime<Utc>> {
        self.dismissed_at
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed_at.is_some()
    }

    pub fn storage_key(&self) -> String {
        storage_key(&self.user_id, &self.id)
    }
}

/// Builds and derives item versions.
pub struct ItemFactory;

impl ItemFactory {
    pub fn create(
        id: impl Into<String>,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
        dismissed_at: Option<DateTime<Utc>>,
    ) -> Result<Item> {
        let id = id.into();
        let user_id = user_id.into();

        validate_identity("itemId", &id)?;
        validate_identity("userId", &user_id)?;

        if let Some(dismissed) = dismissed_at {
            if dismissed < created_at {
                return Err(Error::InvalidArgument(format!(
                    "dismissedAt {} precedes createdAt {}",
                    dismissed.to_rfc3339(),
                    created_at.to_rfc3339()
                )));
            }
        }

        Ok(Item {
            id,
            user_id,
            created_at,
            dismissed_at,
        })
    }

    /// Independently owned copy of `item`.
    pub fn clone_item(item: &Item) -> Item {
        item.clone()
    }

    pub fn mark_dismissed(item: &Item, dismissed_at: DateTime<Utc>) -> Result<Item> {
        if dismissed_at < item.created_at {
            return Err(Error::InvalidState(format!(
                "cannot dismiss item '{}' at {} before it was created at {}",
                item.id,
                dismissed_at.to_rfc3339(),
                item.created_at.to_rfc3339()
            )));
        }

        Ok(Item {
            dismissed_at: Some(dismissed_at),
            ..item.clone()
        })
    }

    pub fn mark_restored(item: &Item) -> Item {
        Item {
            dismissed_at: None,
            ..item.clone()
        }
    }
}

pub mod response {
    use super::Item;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize)]
    pub struct GetOrCreateResponse {
        pub item: Item,
        pub created: bool,
    }

    impl GetOrCreateResponse {
        pub fn new(item: Item, created: bool) -> Self {
            Self { item, created }
        }
    }

    /// Result of a dismiss or restore: the persisted version and the one it replaced.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransitionResponse {
        pub item: Item,
        pub previous_item: Item,
    }

    impl TransitionResponse {
        pub fn new(item: Item, previous_item: Item) -> Self {
            Self {
                item,
                previous_item,
            }
        }
    }
}
