use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dismissible::domain::{Item, ItemFactory};
use dismissible::ports::ItemStore;
use shared::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SELECT_COLUMNS: &str = "SELECT user_id, item_id, created_at, dismissed_at FROM dismissible_items";

// Stays well under SQLITE_MAX_VARIABLE_NUMBER with the extra user_id bind.
const GET_MANY_CHUNK: usize = 500;

const INSERT_ITEM: &str = "INSERT INTO dismissible_items (user_id, item_id, created_at, dismissed_at) VALUES (?, ?, ?, ?)";

fn map_sqlx_err(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut => {
            Error::Timeout("Timed out waiting for a SQLite connection".to_string())
        }
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            Error::Conflict(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => Error::Internal(format!("Failed to decode row: {}", e)),
        other => Error::Unavailable(format!("SQLite error: {}", other)),
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// File path part of a `sqlite://` / `sqlite:` URL, without query parameters.
fn database_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then(|| Path::new(path))
}

fn row_to_item(row: &SqliteRow) -> Result<Item> {
    let user_id: String = row.try_get("user_id").map_err(map_sqlx_err)?;
    let item_id: String = row.try_get("item_id").map_err(map_sqlx_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_err)?;
    let dismissed_at: Option<DateTime<Utc>> =
        row.try_get("dismissed_at").map_err(map_sqlx_err)?;

    ItemFactory::create(item_id, user_id, created_at, dismissed_at)
}

/// Relational backend on SQLite, one row per (user, item) pair.
///
/// The composite primary key turns duplicate `create` calls into `Conflict`;
/// `update` of a missing row is `NotFound`; `create_many` is all-or-nothing.
#[derive(Clone)]
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    /// Connect to `url` (e.g. `sqlite://./data/items.db` or `sqlite::memory:`)
    /// and make sure the schema exists. `timeout` bounds connection acquisition
    /// and lock waits.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        tracing::info!("Opening SQLite database at: {}", url);

        let in_memory = is_in_memory(url);
        if !in_memory {
            if let Some(parent) = database_path(url).and_then(Path::parent) {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        Error::Unavailable(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::InvalidArgument(format!("Invalid SQLite URL '{}': {}", url, e)))?
            .create_if_missing(true)
            .busy_timeout(timeout);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its connection, so the pool
        // holds exactly one that never idles out.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(map_sqlx_err)?;

        Self::run_migrations(&pool).await?;
        tracing::info!("SQLite store ready");

        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", Duration::from_secs(5)).await
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dismissible_items (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                dismissed_at TEXT,
                PRIMARY KEY (user_id, item_id)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn get(&self, user_id: &str, item_id: &str) -> Result<Option<Item>> {
        let sql = format!("{} WHERE user_id = ? AND item_id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn get_many(&self, user_id: &str, item_ids: &[String]) -> Result<HashMap<String, Item>> {
        if item_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut found = HashMap::with_capacity(item_ids.len());
        for chunk in item_ids.chunks(GET_MANY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "{} WHERE user_id = ? AND item_id IN ({})",
                SELECT_COLUMNS, placeholders
            );

            let mut query = sqlx::query(&sql).bind(user_id);
            for item_id in chunk {
                query = query.bind(item_id.as_str());
            }

            let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_err)?;
            for row in &rows {
                let item = row_to_item(row)?;
                found.insert(item.id().to_string(), item);
            }
        }
        Ok(found)
    }

    async fn create(&self, item: Item) -> Result<Item> {
        sqlx::query(INSERT_ITEM)
            .bind(item.user_id())
            .bind(item.id())
            .bind(item.created_at())
            .bind(item.dismissed_at())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(item)
    }

    async fn create_many(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        if items.is_empty() {
            return Ok(items);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        for item in &items {
            sqlx::query(INSERT_ITEM)
                .bind(item.user_id())
                .bind(item.id())
                .bind(item.created_at())
                .bind(item.dismissed_at())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;

        tracing::debug!("Inserted {} item(s) in one transaction", items.len());
        Ok(items)
    }

    async fn update(&self, item: Item) -> Result<Item> {
        let row = sqlx::query(
            "UPDATE dismissible_items SET dismissed_at = ? WHERE user_id = ? AND item_id = ? \
             RETURNING user_id, item_id, created_at, dismissed_at",
        )
        .bind(item.dismissed_at())
        .bind(item.user_id())
        .bind(item.id())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(Error::NotFound),
        }
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM dismissible_items WHERE user_id = ? AND item_id = ?")
            .bind(user_id)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM dismissible_items")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        tracing::debug!("Removed {} row(s)", result.rows_affected());
        Ok(())
    }
}

impl std::fmt::Debug for SqliteItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteItemStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dismissible::clock::{Clock, ManualClock};
    use tempfile::TempDir;

    fn item(clock: &ManualClock, user_id: &str, item_id: &str) -> Item {
        ItemFactory::create(item_id, user_id, clock.now(), None).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_and_conflict() {
        let store = SqliteItemStore::in_memory().await.unwrap();
        let clock = ManualClock::at_epoch();

        let created = store.create(item(&clock, "u1", "banner")).await.unwrap();
        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(created));
        assert_eq!(store.get("u2", "banner").await.unwrap(), None);

        let duplicate = store.create(item(&clock, "u1", "banner")).await;
        assert!(matches!(duplicate, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_persists_dismissal_and_rejects_missing_rows() {
        let store = SqliteItemStore::in_memory().await.unwrap();
        let clock = ManualClock::at_epoch();
        let original = store.create(item(&clock, "u1", "banner")).await.unwrap();

        clock.advance(Duration::from_secs(30));
        let dismissed = ItemFactory::mark_dismissed(&original, clock.now()).unwrap();
        store.update(dismissed.clone()).await.unwrap();
        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(dismissed));

        let missing = item(&clock, "u1", "never-created");
        assert!(matches!(store.update(missing).await, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_create_many_rolls_back_on_conflict() {
        let store = SqliteItemStore::in_memory().await.unwrap();
        let clock = ManualClock::at_epoch();
        store.create(item(&clock, "u1", "b")).await.unwrap();

        let batch = vec![
            item(&clock, "u1", "a"),
            item(&clock, "u1", "b"),
            item(&clock, "u1", "c"),
        ];
        assert!(matches!(
            store.create_many(batch).await,
            Err(Error::Conflict(_))
        ));

        let ids = vec!["a".to_string(), "c".to_string()];
        assert!(store.get_many("u1", &ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_many_is_scoped_to_user() {
        let store = SqliteItemStore::in_memory().await.unwrap();
        let clock = ManualClock::at_epoch();
        store
            .create_many(vec![
                item(&clock, "u1", "a"),
                item(&clock, "u1", "b"),
                item(&clock, "u2", "c"),
            ])
            .await
            .unwrap();

        let ids = vec!["a".to_string(), "c".to_string(), "z".to_string()];
        let found = store.get_many("u1", &ids).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found["a"].user_id(), "u1");
    }

    #[tokio::test]
    async fn test_get_many_spans_several_chunks() {
        let store = SqliteItemStore::in_memory().await.unwrap();
        let clock = ManualClock::at_epoch();
        let ids: Vec<String> = (0..GET_MANY_CHUNK * 2 + 1).map(|i| format!("item-{}", i)).collect();
        store
            .create_many(ids.iter().map(|id| item(&clock, "u1", id)).collect())
            .await
            .unwrap();

        let found = store.get_many("u1", &ids).await.unwrap();
        assert_eq!(found.len(), ids.len());
        assert!(found.contains_key(ids.last().unwrap()));
    }

    #[tokio::test]
    async fn test_file_database_survives_reconnect() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!(
            "sqlite://{}",
            temp_dir.path().join("nested").join("items.db").display()
        );
        let clock = ManualClock::at_epoch();

        let store = SqliteItemStore::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        let created = store.create(item(&clock, "u1", "banner")).await.unwrap();
        store.close().await;

        let reopened = SqliteItemStore::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reopened.get("u1", "banner").await.unwrap(), Some(created));
    }

    #[test]
    fn test_database_path_parsing() {
        assert_eq!(
            database_path("sqlite://./data/items.db"),
            Some(Path::new("./data/items.db"))
        );
        assert_eq!(
            database_path("sqlite:items.db?mode=rwc"),
            Some(Path::new("items.db"))
        );
        assert_eq!(database_path("postgres://host/db"), None);
        assert!(is_in_memory("sqlite::memory:"));
    }
}
