// ── Generic reactive entity collection ──
//
// Keyed storage for one mirrored collection, with push-based change
// notification via `watch` channels. The controller always sends whole
// collections, so the only bulk write is `replace_all`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;

/// Entities that carry a controller-assigned string id.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// One published state: the ordered entities and a key index into them.
struct Published<T> {
    ordered: Arc<Vec<Arc<T>>>,
    by_key: HashMap<String, Arc<T>>,
}

impl<T: Keyed> Published<T> {
    fn from_ordered(ordered: Vec<Arc<T>>) -> Self {
        let by_key = ordered
            .iter()
            .map(|e| (e.key().to_owned(), Arc::clone(e)))
            .collect();
        Self {
            ordered: Arc::new(ordered),
            by_key,
        }
    }
}

/// A reactive collection for a single entity type.
///
/// Each mutation builds a fresh [`Published`] and swaps it in whole, so a
/// reader never sees part of one push and part of another. Writers are
/// serialized by the `state` channel's lock; the subscriber snapshot and the
/// version counter are republished under that same lock.
pub(crate) struct EntityCollection<T: Keyed + Clone + Send + Sync + 'static> {
    state: watch::Sender<Arc<Published<T>>>,

    /// Version counter, bumped on every mutation. Zero until the first push.
    version: watch::Sender<u64>,

    /// Full snapshot in controller order.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Keyed + Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(Published::from_ordered(Vec::new())));
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            state,
            version,
            snapshot,
        }
    }

    /// Replace the whole collection in one step. Entities absent from
    /// `entities` are gone once this returns. Duplicate ids keep the
    /// first occurrence.
    pub(crate) fn replace_all(&self, entities: Vec<T>) {
        let mut seen = HashSet::with_capacity(entities.len());
        let values: Vec<Arc<T>> = entities
            .into_iter()
            .filter(|e| seen.insert(e.key().to_owned()))
            .map(Arc::new)
            .collect();

        self.publish(|_| Some(values));
    }

    /// Apply `f` to one entity in place. Returns `false` if the key is unknown.
    pub(crate) fn modify(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        self.publish(|current| {
            let existing = current.by_key.get(key)?;
            let mut updated = T::clone(existing);
            f(&mut updated);
            let updated = Arc::new(updated);
            Some(
                current
                    .ordered
                    .iter()
                    .map(|e| {
                        if e.key() == key {
                            Arc::clone(&updated)
                        } else {
                            Arc::clone(e)
                        }
                    })
                    .collect(),
            )
        })
    }

    /// Swap in the ordered list `build` returns, or leave everything
    /// untouched when it returns `None`.
    fn publish(&self, build: impl FnOnce(&Published<T>) -> Option<Vec<Arc<T>>>) -> bool {
        self.state.send_if_modified(|current| {
            let Some(ordered) = build(current) else {
                return false;
            };
            let next = Published::from_ordered(ordered);
            self.snapshot.send_replace(Arc::clone(&next.ordered));
            *current = Arc::new(next);
            self.version.send_modify(|v| *v += 1);
            true
        })
    }

    fn current(&self) -> Arc<Published<T>> {
        Arc::clone(&self.state.borrow())
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.current().by_key.get(key).cloned()
    }

    /// First entity matching `pred`, in controller order.
    pub(crate) fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.current().ordered.iter().find(|e| pred(e)).cloned()
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.current().ordered)
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.current().ordered.len()
    }

    pub(crate) fn keys(&self) -> HashSet<String> {
        self.current().by_key.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        value: u32,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, value: u32) -> Item {
        Item {
            id: id.into(),
            value,
        }
    }

    #[test]
    fn replace_all_drops_stale_entries() {
        let col = EntityCollection::new();
        col.replace_all(vec![item("a", 1), item("b", 2)]);
        col.replace_all(vec![item("c", 3)]);

        assert!(col.get("a").is_none());
        assert!(col.get("b").is_none());
        assert_eq!(col.get("c").unwrap().value, 3);
        assert_eq!(col.len(), 1);
        assert_eq!(col.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_keeps_push_order_and_first_duplicate() {
        let col = EntityCollection::new();
        col.replace_all(vec![item("z", 1), item("a", 2), item("z", 9)]);

        let ids: Vec<String> = col.snapshot().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["z".to_string(), "a".to_string()]);
        assert_eq!(col.get("z").unwrap().value, 1);
    }

    #[test]
    fn modify_updates_lookup_and_snapshot() {
        let col = EntityCollection::new();
        col.replace_all(vec![item("a", 1), item("b", 2)]);

        assert!(col.modify("b", |i| i.value = 20));
        assert!(!col.modify("missing", |i| i.value = 0));

        assert_eq!(col.get("b").unwrap().value, 20);
        assert_eq!(col.snapshot()[1].value, 20);
        assert_eq!(col.snapshot()[0].value, 1);
    }

    #[test]
    fn version_counts_mutations() {
        let col = EntityCollection::new();
        assert_eq!(col.version(), 0);
        col.replace_all(vec![item("a", 1)]);
        col.modify("a", |i| i.value = 2);
        assert_eq!(col.version(), 2);
    }

    #[test]
    fn find_searches_in_order() {
        let col = EntityCollection::new();
        col.replace_all(vec![item("a", 5), item("b", 5)]);
        assert_eq!(col.find(|i| i.value == 5).unwrap().id, "a");
    }

    #[test]
    fn concurrent_readers_never_see_a_mixed_set() {
        let old: Vec<Item> = (0..64).map(|n| item(&format!("old{n}"), 1)).collect();
        let new: Vec<Item> = (0..64).map(|n| item(&format!("new{n}"), 2)).collect();
        let col = Arc::new(EntityCollection::new());
        col.replace_all(old.clone());

        let reader = {
            let col = Arc::clone(&col);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    let keys = col.keys();
                    let olds = keys.iter().filter(|k| k.starts_with("old")).count();
                    assert!(olds == 0 || olds == keys.len(), "mixed key set: {keys:?}");
                    assert_eq!(keys.len(), 64);

                    let snap = col.snapshot();
                    assert!(snap.iter().all(|i| i.value == snap[0].value));
                    if let Some(first) = col.get("old0") {
                        assert_eq!(first.value, 1);
                    }
                }
            })
        };

        for round in 0..200 {
            col.replace_all(if round % 2 == 0 { new.clone() } else { old.clone() });
        }
        reader.join().unwrap();
        assert_eq!(col.version(), 201);
    }

    #[test]
    fn modify_of_unknown_key_publishes_nothing() {
        let col = EntityCollection::new();
        col.replace_all(vec![item("a", 1)]);
        let rx = col.subscribe();

        assert!(!col.modify("missing", |i| i.value = 9));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(col.version(), 1);
    }
}
