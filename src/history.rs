use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{now_millis, CollectionStore, LoadOutcome, Record, DAY_MS};
use crate::storage::{BackingStore, HISTORY_KEY};
use crate::subscribers::SubscriptionId;
use crate::valuation::BatchValuationResult;

pub const HISTORY_RETENTION_MS: i64 = 7 * DAY_MS;

/// One completed batch valuation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: i64,
    pub batch_result: BatchValuationResult,
}

impl Record for HistoryItem {
    const STORAGE_KEY: &'static str = HISTORY_KEY;
    const RETENTION_MS: i64 = HISTORY_RETENTION_MS;

    fn key(&self) -> &str {
        &self.id
    }

    fn anchor(&self) -> i64 {
        self.timestamp
    }
}

/// Batch valuations of the last week, newest first.
pub struct History {
    store: CollectionStore<HistoryItem>,
}

impl History {
    pub fn load(backing: Rc<dyn BackingStore>) -> (History, LoadOutcome) {
        let (store, outcome) = CollectionStore::load(backing);
        (History { store }, outcome)
    }

    pub fn load_at(backing: Rc<dyn BackingStore>, now: i64) -> (History, LoadOutcome) {
        let (store, outcome) = CollectionStore::load_at(backing, now);
        (History { store }, outcome)
    }

    pub fn items(&self) -> &[HistoryItem] {
        self.store.items()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.store.get(id)
    }

    pub fn write_failures(&self) -> usize {
        self.store.write_failures()
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&[HistoryItem]) + 'static) -> SubscriptionId {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Records a batch result at the front of the history. Every call makes a
    /// new entry, even for an identical result.
    pub fn add_batch(&mut self, batch_result: BatchValuationResult) -> &HistoryItem {
        // v7 ids are time-ordered and unique within the process
        let item = HistoryItem {
            id: Uuid::now_v7().to_string(),
            timestamp: now_millis(),
            batch_result,
        };
        self.store.prepend(item);
        &self.store.items()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::encode;
    use crate::storage::MemoryStore;
    use crate::valuation::Valuation;
    use std::collections::HashSet;

    fn batch(domain: &str) -> BatchValuationResult {
        BatchValuationResult {
            valuations: vec![Valuation {
                domain_name: domain.to_string(),
                estimated_value: 1200.0,
                justification: "two-word .com".to_string(),
            }],
            methodology: "comparable sales".to_string(),
            resources: vec!["namebio".to_string()],
        }
    }

    fn empty_history() -> (History, Rc<dyn BackingStore>) {
        let backing: Rc<dyn BackingStore> = Rc::new(MemoryStore::new());
        let (history, _) = History::load(Rc::clone(&backing));
        (history, backing)
    }

    #[test]
    fn test_newest_first() {
        let (mut history, _) = empty_history();
        history.add_batch(batch("a.com"));
        history.add_batch(batch("b.com"));
        history.add_batch(batch("c.com"));

        let order: Vec<_> = history
            .items()
            .iter()
            .map(|item| item.batch_result.valuations[0].domain_name.as_str())
            .collect();
        assert_eq!(order, vec!["c.com", "b.com", "a.com"]);
    }

    #[test]
    fn test_identical_batches_get_distinct_ids() {
        let (mut history, _) = empty_history();
        for _ in 0..50 {
            history.add_batch(batch("same.com"));
        }
        let ids: HashSet<_> = history.items().iter().map(|item| item.id.clone()).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_add_batch_returns_recorded_item() {
        let (mut history, _) = empty_history();
        let before = now_millis();
        let item = history.add_batch(batch("x.com")).clone();
        assert!(item.timestamp >= before);
        assert_eq!(history.get(&item.id), Some(&item));
    }

    #[test]
    fn test_seven_day_boundary() {
        let now = 1_700_000_000_000;
        let item = |id: &str, timestamp| HistoryItem {
            id: id.to_string(),
            timestamp,
            batch_result: batch("a.com"),
        };
        let stored = vec![
            item("fresh", now - HISTORY_RETENTION_MS + 1),
            item("stale", now - HISTORY_RETENTION_MS - 1),
        ];
        let backing: Rc<dyn BackingStore> =
            Rc::new(MemoryStore::with_entry(HISTORY_KEY, &encode(&stored).unwrap()));

        let (history, outcome) = History::load_at(backing, now);
        assert_eq!(outcome, LoadOutcome::Loaded { kept: 1, expired: 1 });
        assert_eq!(history.items()[0].id, "fresh");
    }

    #[test]
    fn test_extreme_timestamp_is_dropped() {
        let stored = vec![HistoryItem {
            id: "ancient".to_string(),
            timestamp: i64::MIN,
            batch_result: batch("a.com"),
        }];
        let backing: Rc<dyn BackingStore> =
            Rc::new(MemoryStore::with_entry(HISTORY_KEY, &encode(&stored).unwrap()));
        let (history, outcome) = History::load(backing);
        assert_eq!(outcome, LoadOutcome::Loaded { kept: 0, expired: 1 });
        assert!(history.is_empty());
    }

    #[test]
    fn test_reload_keeps_order() {
        let (mut history, backing) = empty_history();
        history.add_batch(batch("a.com"));
        history.add_batch(batch("b.com"));

        let (reloaded, _) = History::load(backing);
        assert_eq!(reloaded.items(), history.items());
    }

    #[test]
    fn test_corrupt_history_recovers() {
        let backing: Rc<dyn BackingStore> =
            Rc::new(MemoryStore::with_entry(HISTORY_KEY, "[{\"id\": 1}]"));
        let (history, outcome) = History::load(backing);
        assert!(outcome.is_recovered());
        assert!(history.is_empty());
    }
}
