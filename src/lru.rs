//! Access-order index used for least-recently-used eviction.
//!
//! Instead of intrusive prev/next links, every key carries a monotonically
//! increasing access stamp and an ordered map from stamp to key gives the
//! eviction order. Keys are plain handles; the index never owns the items.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct AccessList<K> {
    clock: u64,
    order: BTreeMap<u64, K>,
    stamps: FxHashMap<K, u64>,
}

impl<K: Copy + Eq + Hash> AccessList<K> {
    pub fn new() -> Self {
        Self {
            clock: 0,
            order: BTreeMap::new(),
            stamps: FxHashMap::default(),
        }
    }

    /// Mark `key` as most recently used, inserting it if absent.
    pub fn touch(&mut self, key: K) {
        self.clock += 1;
        if let Some(old) = self.stamps.insert(key, self.clock) {
            self.order.remove(&old);
        }
        self.order.insert(self.clock, key);
    }

    /// Unlink `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.stamps.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.stamps.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Least recently used key.
    pub fn oldest(&self) -> Option<K> {
        self.order.values().next().copied()
    }

    /// Keys from least to most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = K> + '_ {
        self.order.values().copied()
    }

    /// Keys from most to least recently used.
    pub fn iter_mru(&self) -> impl Iterator<Item = K> + '_ {
        self.order.values().rev().copied()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }
}

impl<K: Copy + Eq + Hash> Default for AccessList<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_orders_by_recency() {
        let mut list = AccessList::new();
        list.touch(1);
        list.touch(2);
        list.touch(3);
        list.touch(1);

        assert_eq!(list.iter_lru().collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(list.iter_mru().collect::<Vec<_>>(), vec![1, 3, 2]);
        assert_eq!(list.oldest(), Some(2));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut list = AccessList::new();
        list.touch("a");
        list.touch("b");
        assert!(list.remove(&"a"));
        assert!(!list.remove(&"a"));
        assert!(!list.contains(&"a"));
        assert_eq!(list.oldest(), Some("b"));

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.oldest(), None);
    }
}
