//! Generic persisted collection: an ordered in-memory list of records that is
//! written back to the backing store as a single JSON array after every
//! committed mutation.
//!
//! Expiry is a load-time hygiene pass. A record that crosses its retention
//! window mid-session stays visible until the next load.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::storage::BackingStore;
use crate::subscribers::{SubscriptionId, Subscribers};

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// A record that can live in a [`CollectionStore`].
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Key in the backing store holding the whole collection.
    const STORAGE_KEY: &'static str;
    /// Records older than this (in milliseconds) are dropped at load.
    const RETENTION_MS: i64;

    /// Unique key of the record within its collection.
    fn key(&self) -> &str;

    /// Creation timestamp (epoch milliseconds) used for expiry.
    fn anchor(&self) -> i64;
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Age saturates, so an anchor near `i64::MIN` reads as expired.
pub fn is_fresh(now: i64, anchor: i64, window_ms: i64) -> bool {
    now.saturating_sub(anchor) < window_ms
}

/// Drops every record that is past its retention window. Returns the number
/// of records removed.
pub fn retain_fresh<R: Record>(records: &mut Vec<R>, now: i64) -> usize {
    let before = records.len();
    records.retain(|record| is_fresh(now, record.anchor(), R::RETENTION_MS));
    before - records.len()
}

pub fn encode<R: Serialize>(records: &[R]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(records)?)
}

pub fn decode<R: DeserializeOwned>(raw: &str) -> Result<Vec<R>, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

/// What happened when a collection was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored under the collection's key.
    Missing,
    /// Stored data parsed; `expired` records were dropped.
    Loaded { kept: usize, expired: usize },
    /// Stored data could not be read or parsed; the collection starts empty.
    Recovered { reason: String },
}

impl LoadOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, LoadOutcome::Recovered { .. })
    }
}

pub struct CollectionStore<R: Record> {
    backing: Rc<dyn BackingStore>,
    items: Vec<R>,
    subscribers: Subscribers<[R]>,
    write_failures: usize,
}

impl<R: Record> CollectionStore<R> {
    pub fn load(backing: Rc<dyn BackingStore>) -> (Self, LoadOutcome) {
        Self::load_at(backing, now_millis())
    }

    /// Loads the collection as of `now`. Never fails: unreadable data yields
    /// an empty collection and a [`LoadOutcome::Recovered`].
    pub fn load_at(backing: Rc<dyn BackingStore>, now: i64) -> (Self, LoadOutcome) {
        let (items, outcome) = match backing.read(R::STORAGE_KEY) {
            Ok(None) => (Vec::new(), LoadOutcome::Missing),
            Ok(Some(raw)) => match decode::<R>(&raw) {
                Ok(mut items) => {
                    let expired = retain_fresh(&mut items, now);
                    let kept = items.len();
                    (items, LoadOutcome::Loaded { kept, expired })
                }
                Err(e) => {
                    error!(key = R::STORAGE_KEY, "Error reading collection: {e}");
                    (Vec::new(), LoadOutcome::Recovered { reason: e.to_string() })
                }
            },
            Err(e) => {
                error!(key = R::STORAGE_KEY, "Error reading collection: {e}");
                (Vec::new(), LoadOutcome::Recovered { reason: e.to_string() })
            }
        };
        debug!(key = R::STORAGE_KEY, ?outcome, "collection loaded");

        let store = CollectionStore {
            backing,
            items,
            subscribers: Subscribers::new(),
            write_failures: 0,
        };
        (store, outcome)
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&R> {
        self.items.iter().find(|record| record.key() == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of durable writes that failed this session. The in-memory state
    /// is kept regardless, so a non-zero count means the next load may miss
    /// changes.
    pub fn write_failures(&self) -> usize {
        self.write_failures
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&[R]) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Appends every record whose key is not yet present, including keys seen
    /// earlier in the same batch. Returns how many were inserted.
    pub fn insert_unique(&mut self, records: impl IntoIterator<Item = R>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.contains(record.key()) {
                debug!(key = record.key(), "skipping duplicate record");
                continue;
            }
            self.items.push(record);
            inserted += 1;
        }
        if inserted > 0 {
            self.commit();
        }
        inserted
    }

    pub fn prepend(&mut self, record: R) {
        self.items.insert(0, record);
        self.commit();
    }

    /// Replaces the record with the same key, or appends it. `merge` receives
    /// the incoming record and the one it replaces.
    pub fn replace_or_push(&mut self, record: R, merge: impl FnOnce(&mut R, R)) -> &R {
        let index = match self.items.iter().position(|r| r.key() == record.key()) {
            Some(index) => {
                let previous = std::mem::replace(&mut self.items[index], record);
                merge(&mut self.items[index], previous);
                index
            }
            None => {
                self.items.push(record);
                self.items.len() - 1
            }
        };
        self.commit();
        &self.items[index]
    }

    /// Applies `change` to the record with `key`. Returns false, without
    /// writing or notifying, if no such record exists.
    pub fn modify(&mut self, key: &str, change: impl FnOnce(&mut R)) -> bool {
        match self.items.iter_mut().find(|record| record.key() == key) {
            Some(record) => {
                change(record);
                self.commit();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<R> {
        let index = self.items.iter().position(|record| record.key() == key)?;
        let removed = self.items.remove(index);
        self.commit();
        Some(removed)
    }

    fn commit(&mut self) {
        self.persist();
        self.subscribers.notify(&self.items);
    }

    fn persist(&mut self) {
        let result = encode(&self.items)
            .and_then(|raw| self.backing.write(R::STORAGE_KEY, &raw));
        if let Err(e) = result {
            self.write_failures += 1;
            error!(key = R::STORAGE_KEY, "Error saving collection: {e}");
            warn!(
                key = R::STORAGE_KEY,
                failures = self.write_failures,
                "in-memory state is ahead of durable storage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde::Deserialize;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        name: String,
        created: i64,
        body: String,
    }

    impl Record for Note {
        const STORAGE_KEY: &'static str = "notes";
        const RETENTION_MS: i64 = HOUR_MS;

        fn key(&self) -> &str {
            &self.name
        }

        fn anchor(&self) -> i64 {
            self.created
        }
    }

    fn note(name: &str, created: i64) -> Note {
        Note {
            name: name.to_string(),
            created,
            body: String::new(),
        }
    }

    /// Backing store whose writes always fail.
    struct ReadOnlyStore;

    impl BackingStore for ReadOnlyStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidUtf8("read-only".to_string()))
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let now = 1_700_000_000_000;
        assert!(is_fresh(now, now - HOUR_MS + 1, HOUR_MS));
        assert!(!is_fresh(now, now - HOUR_MS, HOUR_MS));
        assert!(!is_fresh(now, now - HOUR_MS - 1, HOUR_MS));
        assert!(!is_fresh(now, i64::MIN, HOUR_MS));
        assert!(!is_fresh(now, i64::MIN + 1, HOUR_MS));
    }

    #[test]
    fn test_load_extreme_anchor_is_expired() {
        let now = 1_700_000_000_000;
        let stored = vec![note("ancient", i64::MIN), note("new", now)];
        let backing = Rc::new(MemoryStore::with_entry("notes", &encode(&stored).unwrap()));

        let (store, outcome) = CollectionStore::<Note>::load_at(backing, now);
        assert_eq!(outcome, LoadOutcome::Loaded { kept: 1, expired: 1 });
        assert_eq!(store.items()[0].name, "new");
    }

    #[test]
    fn test_load_missing_key() {
        let (store, outcome) = CollectionStore::<Note>::load(Rc::new(MemoryStore::new()));
        assert_eq!(outcome, LoadOutcome::Missing);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_data_recovers_empty() {
        let backing = Rc::new(MemoryStore::with_entry("notes", "{not json"));
        let (store, outcome) = CollectionStore::<Note>::load(backing);
        assert!(outcome.is_recovered());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_wrong_shape_recovers_empty() {
        let backing = Rc::new(MemoryStore::with_entry("notes", r#"{"name":"a"}"#));
        let (store, outcome) = CollectionStore::<Note>::load(backing);
        assert!(outcome.is_recovered());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_drops_expired_records() {
        let now = 1_700_000_000_000;
        let stored = vec![note("old", now - HOUR_MS - 1), note("new", now - HOUR_MS + 1)];
        let backing = Rc::new(MemoryStore::with_entry("notes", &encode(&stored).unwrap()));

        let (store, outcome) = CollectionStore::<Note>::load_at(backing, now);
        assert_eq!(outcome, LoadOutcome::Loaded { kept: 1, expired: 1 });
        assert_eq!(store.items(), &[note("new", now - HOUR_MS + 1)]);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let backing: Rc<dyn BackingStore> = Rc::new(MemoryStore::new());
        let now = now_millis();
        let (mut store, _) = CollectionStore::<Note>::load(Rc::clone(&backing));
        store.insert_unique(vec![note("b", now), note("a", now), note("c", now)]);

        let (reloaded, outcome) = CollectionStore::<Note>::load(backing);
        assert_eq!(outcome, LoadOutcome::Loaded { kept: 3, expired: 0 });
        assert_eq!(reloaded.items(), store.items());
    }

    #[test]
    fn test_insert_unique_skips_duplicates_within_batch() {
        let (mut store, _) = CollectionStore::<Note>::load(Rc::new(MemoryStore::new()));
        let inserted = store.insert_unique(vec![note("a", 1), note("a", 2), note("b", 3)]);
        assert_eq!(inserted, 2);
        assert_eq!(store.get("a").map(|n| n.created), Some(1));
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let (mut store, _) = CollectionStore::<Note>::load(Rc::new(ReadOnlyStore));
        store.prepend(note("a", now_millis()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_failures(), 1);

        store.remove("a");
        assert!(store.is_empty());
        assert_eq!(store.write_failures(), 2);
    }

    #[test]
    fn test_subscribers_see_committed_snapshot_only() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (mut store, _) = CollectionStore::<Note>::load(Rc::new(MemoryStore::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(move |notes| {
            sink.borrow_mut()
                .push(notes.iter().map(|n| n.name.clone()).collect::<Vec<_>>())
        });

        store.insert_unique(vec![note("a", 1)]);
        store.insert_unique(vec![note("a", 2)]);
        assert!(!store.modify("missing", |n| n.body.push('x')));
        assert!(store.remove("missing").is_none());
        store.prepend(note("b", 3));
        assert!(store.unsubscribe(id));
        store.remove("a");

        assert_eq!(
            *seen.borrow(),
            vec![vec!["a".to_string()], vec!["b".to_string(), "a".to_string()]]
        );
    }

    #[test]
    fn test_replace_or_push_merges_with_previous() {
        let (mut store, _) = CollectionStore::<Note>::load(Rc::new(MemoryStore::new()));
        store.insert_unique(vec![Note {
            name: "a".to_string(),
            created: 1,
            body: "kept".to_string(),
        }]);

        store.replace_or_push(note("a", 5), |new, old| {
            if new.body.is_empty() {
                new.body = old.body;
            }
        });
        let b = store.replace_or_push(note("b", 6), |_, _| panic!("nothing to merge"));
        assert_eq!(b.created, 6);

        assert_eq!(store.len(), 2);
        let a = store.get("a").unwrap();
        assert_eq!((a.created, a.body.as_str()), (5, "kept"));
    }
}
