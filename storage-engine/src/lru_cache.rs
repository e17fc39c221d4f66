use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dismissible::clock::Clock;
use dismissible::domain::{Item, ItemFactory, storage_key, validate_identity};
use dismissible::ports::ItemStore;
use parking_lot::Mutex;
use shared::Result;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Entry {
    key: String,
    item: Item,
    expires_at: DateTime<Utc>,
    prev: Option<usize>,
    next: Option<usize>,
}

enum Lookup {
    Hit(Item),
    Expired,
    Miss,
}

/// Recency-ordered index: a doubly linked list threaded through an arena of
/// slots (head = most recently used, tail = least), plus key -> slot.
/// Freed slots are recycled before the arena grows, so the arena never holds
/// more than `max_items` slots.
#[derive(Default)]
struct LruIndex {
    map: HashMap<String, usize>,
    slots: Vec<Entry>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruIndex {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        self.slots[slot].prev = None;
        self.slots[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = None;
        self.slots[slot].next = self.head;

        if let Some(h) = self.head {
            self.slots[h].prev = Some(slot);
        }
        self.head = Some(slot);

        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn promote(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.map.remove(key) {
            Some(slot) => {
                self.unlink(slot);
                self.free.push(slot);
                true
            }
            None => false,
        }
    }

    fn pop_lru(&mut self) -> Option<String> {
        let slot = self.tail?;
        let key = self.slots[slot].key.clone();
        self.remove(&key);
        Some(key)
    }

    fn lookup(&mut self, key: &str, now: DateTime<Utc>) -> Lookup {
        let Some(&slot) = self.map.get(key) else {
            return Lookup::Miss;
        };

        if now >= self.slots[slot].expires_at {
            self.remove(key);
            return Lookup::Expired;
        }

        self.promote(slot);
        Lookup::Hit(self.slots[slot].item.clone())
    }

    /// Insert or overwrite `key`, making it most recently used.
    /// Returns the key evicted to make room, if any.
    fn insert(
        &mut self,
        key: String,
        item: Item,
        expires_at: DateTime<Utc>,
        max_items: usize,
    ) -> Option<String> {
        if let Some(&slot) = self.map.get(&key) {
            let entry = &mut self.slots[slot];
            entry.item = item;
            entry.expires_at = expires_at;
            self.promote(slot);
            return None;
        }

        let evicted = if self.len() >= max_items {
            self.pop_lru()
        } else {
            None
        };

        let entry = Entry {
            key: key.clone(),
            item,
            expires_at,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = entry;
                slot
            }
            None => {
                self.slots.push(entry);
                self.slots.len() - 1
            }
        };

        self.map.insert(key, slot);
        self.push_front(slot);
        evicted
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|&(_, &slot)| now >= self.slots[slot].expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    #[cfg(test)]
    fn keys_by_recency(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            keys.push(self.slots[slot].key.clone());
            cursor = self.slots[slot].next;
        }
        keys
    }
}

/// Bounded, expiring in-process backend.
///
/// * capacity: at most `max_items` keys; inserting a new key into a full store
///   evicts the least recently used one first.
/// * recency: successful `get`, `get_many`, `create` and `update` mark the key
///   most recently used.
/// * expiry: each write stamps `now + ttl`; reads treat `now >= expires_at` as a
///   miss and drop the entry.
///
/// Relaxations of the storage contract: `create` overwrites an existing key and
/// `update` of a missing key inserts it. `update` of a resident key keeps the
/// stored `createdAt` and takes only `dismissedAt`. The only error this store
/// raises is `InvalidArgument`.
pub struct MemoryItemStore {
    index: Mutex<LruIndex>,
    max_items: usize,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryItemStore {
    pub fn new(max_items: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        if max_items == 0 {
            tracing::warn!("Memory store capacity of 0 requested, using 1");
        }

        Self {
            index: Mutex::new(LruIndex::default()),
            max_items: max_items.max(1),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn write(&self, index: &mut LruIndex, item: Item, expires_at: DateTime<Utc>) {
        let key = item.storage_key();
        if let Some(evicted) = index.insert(key, item, expires_at, self.max_items) {
            tracing::debug!("Evicted least recently used item '{}'", evicted);
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.index.lock().purge_expired(now)
    }

    /// Periodically purge expired entries. Lazy expiry on read already keeps
    /// results correct; this only bounds memory held by entries nobody reads.
    /// The task stops once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let Some(store) = store.upgrade() else {
                    break;
                };

                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!("Sweeper purged {} expired item(s)", purged);
                }
            }
        })
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn get(&self, user_id: &str, item_id: &str) -> Result<Option<Item>> {
        validate_identity("userId", user_id)?;
        validate_identity("itemId", item_id)?;

        let key = storage_key(user_id, item_id);
        let now = self.clock.now();

        match self.index.lock().lookup(&key, now) {
            Lookup::Hit(item) => {
                tracing::debug!("Cache hit for '{}'", key);
                Ok(Some(item))
            }
            Lookup::Expired => {
                tracing::debug!("Cache entry '{}' expired", key);
                Ok(None)
            }
            Lookup::Miss => Ok(None),
        }
    }

    async fn get_many(&self, user_id: &str, item_ids: &[String]) -> Result<HashMap<String, Item>> {
        validate_identity("userId", user_id)?;
        for item_id in item_ids {
            validate_identity("itemId", item_id)?;
        }

        let now = self.clock.now();
        let mut index = self.index.lock();
        let mut found = HashMap::new();

        for item_id in item_ids {
            if let Lookup::Hit(item) = index.lookup(&storage_key(user_id, item_id), now) {
                found.insert(item_id.clone(), item);
            }
        }

        Ok(found)
    }

    async fn create(&self, item: Item) -> Result<Item> {
        let expires_at = self.expires_at(self.clock.now());
        self.write(&mut self.index.lock(), item.clone(), expires_at);
        Ok(item)
    }

    async fn create_many(&self, items: Vec<Item>) -> Result<Vec<Item>> {
        if items.is_empty() {
            return Ok(items);
        }

        let expires_at = self.expires_at(self.clock.now());
        let mut index = self.index.lock();
        for item in &items {
            self.write(&mut index, item.clone(), expires_at);
        }

        Ok(items)
    }

    async fn update(&self, item: Item) -> Result<Item> {
        let now = self.clock.now();
        let mut index = self.index.lock();

        let merged = match index.lookup(&item.storage_key(), now) {
            Lookup::Hit(stored) => ItemFactory::create(
                stored.id(),
                stored.user_id(),
                stored.created_at(),
                item.dismissed_at(),
            )?,
            Lookup::Expired | Lookup::Miss => item,
        };

        self.write(&mut index, merged.clone(), self.expires_at(now));
        Ok(merged)
    }

    async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        validate_identity("userId", user_id)?;
        validate_identity("itemId", item_id)?;

        self.index.lock().remove(&storage_key(user_id, item_id));
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        *self.index.lock() = LruIndex::default();
        Ok(())
    }
}

impl Debug for MemoryItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryItemStore")
            .field("entry_count", &self.len())
            .field("max_items", &self.max_items)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dismissible::clock::ManualClock;
    use dismissible::domain::ItemFactory;
    use shared::Error;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store(max_items: usize, ttl: Duration) -> (Arc<ManualClock>, MemoryItemStore) {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = MemoryItemStore::new(max_items, ttl, clock.clone());
        (clock, store)
    }

    fn item(clock: &ManualClock, item_id: &str) -> Item {
        ItemFactory::create(item_id, "u1", clock.now(), None).unwrap()
    }

    async fn present(store: &MemoryItemStore, item_id: &str) -> bool {
        store.get("u1", item_id).await.unwrap().is_some()
    }

    fn recency(store: &MemoryItemStore) -> Vec<String> {
        store.index.lock().keys_by_recency()
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let (clock, store) = store(10, HOUR);
        let created = store.create(item(&clock, "banner")).await.unwrap();

        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(created));
        assert_eq!(store.get("u1", "missing").await.unwrap(), None);
        assert_eq!(store.get("u2", "banner").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent_inserts() {
        let (clock, store) = store(5, HOUR);

        for i in 0..8 {
            store.create(item(&clock, &format!("k{}", i))).await.unwrap();
        }

        assert_eq!(store.len(), 5);
        for i in 0..3 {
            assert!(!present(&store, &format!("k{}", i)).await);
        }
        for i in 3..8 {
            assert!(present(&store, &format!("k{}", i)).await);
        }
    }

    #[tokio::test]
    async fn test_get_promotes_entry_out_of_eviction() {
        let (clock, store) = store(3, HOUR);
        for key in ["k0", "k1", "k2"] {
            store.create(item(&clock, key)).await.unwrap();
        }

        assert!(present(&store, "k0").await);
        store.create(item(&clock, "k3")).await.unwrap();

        assert!(!present(&store, "k1").await);
        assert!(present(&store, "k0").await);
        assert!(present(&store, "k2").await);
        assert!(present(&store, "k3").await);
    }

    #[tokio::test]
    async fn test_two_slot_scenario() {
        let (clock, store) = store(2, HOUR);

        store.create(item(&clock, "A")).await.unwrap();
        store.create(item(&clock, "B")).await.unwrap();
        assert_eq!(store.len(), 2);

        assert!(present(&store, "A").await);
        store.create(item(&clock, "C")).await.unwrap();

        assert!(present(&store, "A").await);
        assert!(!present(&store, "B").await);
        assert!(present(&store, "C").await);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let ttl = Duration::from_secs(10);
        let (clock, store) = store(10, ttl);
        store.create(item(&clock, "banner")).await.unwrap();

        clock.advance(ttl - Duration::from_millis(1));
        assert!(present(&store, "banner").await);

        clock.advance(Duration::from_millis(2));
        assert!(!present(&store, "banner").await);
        // lazily removed on the missed read
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_refreshes_expiry_and_upserts() {
        let ttl = Duration::from_secs(10);
        let (clock, store) = store(10, ttl);
        let original = store.create(item(&clock, "banner")).await.unwrap();

        clock.advance(Duration::from_secs(8));
        let dismissed = ItemFactory::mark_dismissed(&original, clock.now()).unwrap();
        store.update(dismissed.clone()).await.unwrap();

        clock.advance(Duration::from_secs(8));
        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(dismissed));

        // update of a key that was never created inserts it
        let fresh = item(&clock, "fresh");
        store.update(fresh.clone()).await.unwrap();
        assert_eq!(store.get("u1", "fresh").await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn test_update_of_resident_key_keeps_created_at() {
        let (clock, store) = store(10, HOUR);
        let original = store.create(item(&clock, "banner")).await.unwrap();

        clock.advance(Duration::from_secs(60));
        let rewritten = ItemFactory::create("banner", "u1", clock.now(), Some(clock.now())).unwrap();
        let stored = store.update(rewritten).await.unwrap();

        assert_eq!(stored.created_at(), original.created_at());
        assert_eq!(stored.dismissed_at(), Some(clock.now()));
        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_create_overwrites_existing_key() {
        let (clock, store) = store(2, HOUR);
        let first = store.create(item(&clock, "banner")).await.unwrap();
        store.create(item(&clock, "other")).await.unwrap();

        let dismissed = ItemFactory::mark_dismissed(&first, clock.now()).unwrap();
        store.create(dismissed.clone()).await.unwrap();

        // overwriting does not count against capacity
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("u1", "banner").await.unwrap(), Some(dismissed));
        assert!(present(&store, "other").await);
    }

    #[tokio::test]
    async fn test_get_many_skips_missing_and_expired() {
        let ttl = Duration::from_secs(10);
        let (clock, store) = store(10, ttl);
        store.create(item(&clock, "old")).await.unwrap();
        clock.advance(Duration::from_secs(6));
        store.create(item(&clock, "new")).await.unwrap();
        clock.advance(Duration::from_secs(6));

        let ids = vec!["old".to_string(), "new".to_string(), "absent".to_string()];
        let found = store.get_many("u1", &ids).await.unwrap();

        assert_eq!(found.len(), 1);
        assert!(found.contains_key("new"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_many_promotes_hits() {
        let (clock, store) = store(3, HOUR);
        for key in ["k0", "k1", "k2"] {
            store.create(item(&clock, key)).await.unwrap();
        }

        store.get_many("u1", &["k0".to_string()]).await.unwrap();
        assert_eq!(recency(&store), vec!["u1:k0", "u1:k2", "u1:k1"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_frees_capacity() {
        let (clock, store) = store(2, HOUR);
        store.create(item(&clock, "a")).await.unwrap();
        store.create(item(&clock, "b")).await.unwrap();

        store.delete("u1", "a").await.unwrap();
        store.delete("u1", "a").await.unwrap();
        assert_eq!(store.len(), 1);

        store.create(item(&clock, "c")).await.unwrap();
        assert!(present(&store, "b").await);
        assert!(present(&store, "c").await);
    }

    #[tokio::test]
    async fn test_delete_all_resets_structure() {
        let (clock, store) = store(3, HOUR);
        for key in ["a", "b", "c"] {
            store.create(item(&clock, key)).await.unwrap();
        }

        store.delete_all().await.unwrap();
        assert!(store.is_empty());
        assert!(recency(&store).is_empty());

        store.create(item(&clock, "d")).await.unwrap();
        assert_eq!(recency(&store), vec!["u1:d"]);
    }

    #[tokio::test]
    async fn test_create_many_respects_capacity() {
        let (clock, store) = store(3, HOUR);
        let items: Vec<Item> = (0..5).map(|i| item(&clock, &format!("k{}", i))).collect();

        let stored = store.create_many(items).await.unwrap();
        assert_eq!(stored.len(), 5);
        assert_eq!(recency(&store), vec!["u1:k4", "u1:k3", "u1:k2"]);

        assert!(store.create_many(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_identity_is_rejected() {
        let (_clock, store) = store(3, HOUR);

        assert!(matches!(
            store.get("u1", "bad key").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.delete("", "banner").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.get_many("u1", &["a:b".to_string()]).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ttl = Duration::from_secs(10);
        let (clock, store) = store(10, ttl);
        store.create(item(&clock, "a")).await.unwrap();
        store.create(item(&clock, "b")).await.unwrap();
        clock.advance(Duration::from_secs(5));
        store.create(item(&clock, "c")).await.unwrap();

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(recency(&store), vec!["u1:c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(MemoryItemStore::new(10, Duration::from_secs(1), clock.clone()));
        store.create(item(&clock, "a")).await.unwrap();

        let handle = store.spawn_sweeper(Duration::from_millis(10));
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.is_empty());

        drop(store);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_invariants() {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(MemoryItemStore::new(50, HOUR, clock.clone()));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            let clock = clock.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let id = format!("w{}-{}", worker, i);
                    store.create(item(&clock, &id)).await.unwrap();
                    store.get("u1", &id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 50);
        let keys = recency(&store);
        assert_eq!(keys.len(), 50);
        let index = store.index.lock();
        assert!(keys.iter().all(|k| index.map.contains_key(k)));
        assert!(index.slots.len() <= 50);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = MemoryItemStore::new(0, HOUR, Arc::new(ManualClock::at_epoch()));
        assert_eq!(store.max_items(), 1);
    }
}
