//! Eviction-Ordered Store Module
//!
//! Key/value map that keeps a recency order and, when bounded, evicts
//! according to its policy as part of the inserting call.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::cache::policy::{EvictionPolicy, Lru, VictimEnd};

#[derive(Debug)]
struct Slot<V> {
    value: V,
    /// Position in `order`; larger = more recent
    tick: u64,
}

// == Eviction-Ordered Store ==
/// Map with a recency order maintained by an [`EvictionPolicy`].
///
/// Every entry owns exactly one position in `order` and every position names a
/// live key. Positions come from a monotonic counter, so entries touched "at
/// the same time" still keep their original insertion order.
#[derive(Debug)]
pub struct EvictionOrderedStore<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Tick -> key, oldest first
    order: BTreeMap<u64, K>,
    next_tick: u64,
    max_size: Option<usize>,
    policy: Box<dyn EvictionPolicy>,
}

impl<K, V> EvictionOrderedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an LRU store. `None` or `Some(0)` means unbounded.
    pub fn new(max_size: Option<usize>) -> Self {
        Self::with_policy(max_size, Box::new(Lru))
    }

    pub fn with_policy(max_size: Option<usize>, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
            max_size: max_size.filter(|&max| max > 0),
            policy,
        }
    }

    pub fn policy(&self) -> &dyn EvictionPolicy {
        self.policy.as_ref()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    // == Put ==
    /// Inserts or replaces `key`.
    ///
    /// When the key is new and the store is full, the policy's victim is
    /// removed first and returned, so the bound holds when the call returns.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick;
        self.next_tick += 1;

        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            if self.policy.promotes_on_write() {
                self.order.remove(&slot.tick);
                slot.tick = tick;
                self.order.insert(tick, key);
            }
            return None;
        }

        let evicted = match self.max_size {
            Some(max) if self.entries.len() >= max => self.pop_victim(),
            _ => None,
        };

        self.order.insert(tick, key.clone());
        self.entries.insert(key, Slot { value, tick });
        evicted
    }

    // == Get ==
    /// Returns the value for `key`, promoting it when the policy says so.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|v| &*v)
    }

    /// Mutable lookup with the same promotion rules as [`get`](Self::get).
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let tick = self.next_tick;
        let slot = self.entries.get_mut(key)?;
        if self.policy.promotes_on_read() {
            self.next_tick += 1;
            self.order.remove(&slot.tick);
            slot.tick = tick;
            self.order.insert(tick, key.clone());
        }
        Some(&mut slot.value)
    }

    // == Peek ==
    /// Lookup with no effect on the order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    // == Remove ==
    /// Removes `key`, returning its value. Absent keys return `None`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    /// Removes `key` only if `predicate` holds for its current value.
    pub fn remove_if<F>(&mut self, key: &K, predicate: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        if self.peek(key).is_some_and(predicate) {
            self.remove(key)
        } else {
            None
        }
    }

    // == Evict ==
    /// Removes and returns the entry the policy would evict next.
    pub fn pop_victim(&mut self) -> Option<(K, V)> {
        let tick = match self.policy.victim() {
            VictimEnd::Oldest => *self.order.keys().next()?,
            VictimEnd::Newest => *self.order.keys().next_back()?,
        };
        let key = self.order.remove(&tick)?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value))
    }

    /// Least recently promoted key.
    pub fn peek_oldest(&self) -> Option<&K> {
        self.order.values().next()
    }

    // == Iteration ==
    /// Entries in recency order, least recent first.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.order
            .values()
            .filter_map(move |key| {
                self.entries
                    .get_key_value(key)
                    .map(|(k, slot)| (k, &slot.value))
            })
    }

    /// Keys in recency order, least recent first.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::{Fifo, Mru};

    fn key(i: usize) -> String {
        format!("key:{}", i)
    }

    fn data(i: usize) -> String {
        format!("data:{}", i)
    }

    #[test]
    fn test_put_with_size_limit() {
        let mut store = EvictionOrderedStore::new(Some(10));
        for i in 0..10 {
            store.put(key(i), data(i));
        }
        for i in 0..10 {
            assert_eq!(store.get(&key(i)), Some(&data(i)));
        }
    }

    #[test]
    fn test_put_with_no_size_limit() {
        let mut store = EvictionOrderedStore::new(None);
        for i in 0..10 {
            store.put(key(i), data(i));
        }
        for i in 0..10 {
            assert_eq!(store.get(&key(i)), Some(&data(i)));
        }
    }

    #[test]
    fn test_put_over_limit_keeps_newest() {
        let mut store = EvictionOrderedStore::new(Some(10));
        for i in 0..20 {
            store.put(key(i), data(i));
            assert!(store.len() <= 10);
        }
        for i in 0..10 {
            assert!(store.peek(&key(i)).is_none(), "{} should be evicted", key(i));
        }
        for i in 10..20 {
            assert_eq!(store.peek(&key(i)), Some(&data(i)));
        }
    }

    #[test]
    fn test_put_and_remove() {
        let mut store = EvictionOrderedStore::new(Some(10));
        store.put(key(1), data(1));
        assert_eq!(store.remove(&key(1)), Some(data(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_empty() {
        let mut store: EvictionOrderedStore<String, String> = EvictionOrderedStore::new(Some(10));
        assert_eq!(store.remove(&key(1)), None);
    }

    #[test]
    fn test_entries_complete_and_ordered() {
        let mut store = EvictionOrderedStore::new(Some(10));
        for i in 0..10 {
            store.put(key(i), data(i));
        }
        let entries: Vec<_> = store.entries().collect();
        assert_eq!(entries.len(), 10);
        for (i, (k, v)) in entries.into_iter().enumerate() {
            assert_eq!(*k, key(i));
            assert_eq!(*v, data(i));
        }
    }

    #[test]
    fn test_get_promotes_and_changes_victim() {
        let mut store = EvictionOrderedStore::new(Some(3));
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);

        store.get(&"a");
        let evicted = store.put("d", 4);

        assert_eq!(evicted, Some(("b", 2)));
        assert!(store.contains(&"a"));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut store = EvictionOrderedStore::new(Some(3));
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);

        assert_eq!(store.peek(&"a"), Some(&1));
        let evicted = store.put("d", 4);

        assert_eq!(evicted, Some(("a", 1)));
    }

    #[test]
    fn test_replace_does_not_evict() {
        let mut store = EvictionOrderedStore::new(Some(2));
        store.put("a", 1);
        store.put("b", 2);

        assert_eq!(store.put("a", 10), None);
        assert_eq!(store.len(), 2);
        assert_eq!(store.peek_oldest(), Some(&"b"));
    }

    #[test]
    fn test_degenerate_size_one() {
        let mut store = EvictionOrderedStore::new(Some(1));
        store.put("a", 1);
        assert_eq!(store.put("b", 2), Some(("a", 1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek(&"b"), Some(&2));
    }

    #[test]
    fn test_size_zero_is_unbounded() {
        let mut store = EvictionOrderedStore::new(Some(0));
        for i in 0..50 {
            store.put(i, i);
        }
        assert_eq!(store.len(), 50);
        assert_eq!(store.max_size(), None);
    }

    #[test]
    fn test_mru_evicts_most_recent() {
        let mut store = EvictionOrderedStore::with_policy(Some(3), Box::new(Mru));
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);

        store.get(&"a");
        let evicted = store.put("d", 4);

        assert_eq!(evicted, Some(("a", 1)));
        assert!(store.contains(&"d"));
    }

    #[test]
    fn test_fifo_ignores_access() {
        let mut store = EvictionOrderedStore::with_policy(Some(3), Box::new(Fifo));
        store.put("a", 1);
        store.put("b", 2);
        store.put("c", 3);

        store.get(&"a");
        store.put("a", 10);
        let evicted = store.put("d", 4);

        assert_eq!(evicted, Some(("a", 10)));
    }

    #[test]
    fn test_remove_if() {
        let mut store = EvictionOrderedStore::new(None);
        store.put("a", 1);

        assert_eq!(store.remove_if(&"a", |v| *v > 5), None);
        assert_eq!(store.remove_if(&"a", |v| *v == 1), Some(1));
        assert!(store.keys().next().is_none());
    }

    #[test]
    fn test_clear_drops_order() {
        let mut store = EvictionOrderedStore::new(Some(5));
        store.put("a", 1);
        store.put("b", 2);
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.peek_oldest(), None);
        assert_eq!(store.pop_victim(), None);
    }
}
