//! Map whose values are held weakly.
//!
//! Collections register their live views here so a view that nobody holds
//! any more stops being maintained. A value that wants prompt cleanup embeds
//! a [`ReclaimHandle`]: when the value is dropped the handle posts its key to
//! the map's reclaim queue, and the map drains that queue at the start of its
//! next operation. Values without a handle are still purged, just lazily,
//! whenever an access finds their weak reference dead.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use crossbeam_queue::SegQueue;

#[derive(Debug)]
pub struct WeakValueHashMap<K, V> {
    map: HashMap<K, Weak<V>>,
    reclaimed: Arc<SegQueue<K>>,
}

/// Posts its key to the owning map's reclaim queue when dropped.
#[derive(Debug)]
pub struct ReclaimHandle<K> {
    key: Option<K>,
    queue: Weak<SegQueue<K>>,
}

impl<K> Drop for ReclaimHandle<K> {
    fn drop(&mut self) {
        if let (Some(key), Some(queue)) = (self.key.take(), self.queue.upgrade()) {
            queue.push(key);
        }
    }
}

impl<K, V> Default for WeakValueHashMap<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            reclaimed: Arc::new(SegQueue::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V> WeakValueHashMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that reports `key` to this map when dropped.
    pub fn reclaim_handle(&self, key: K) -> ReclaimHandle<K> {
        ReclaimHandle {
            key: Some(key),
            queue: Arc::downgrade(&self.reclaimed),
        }
    }

    /// Drains the reclaim queue and drops entries whose value is gone.
    /// Returns the number of entries removed.
    pub fn purge(&mut self) -> usize {
        let mut purged = 0;
        while let Some(key) = self.reclaimed.pop() {
            let dead = self.map.get(&key).is_some_and(|weak| weak.strong_count() == 0);
            if dead {
                self.map.remove(&key);
                purged += 1;
            }
        }
        purged
    }

    pub fn put(&mut self, key: K, value: &Arc<V>) -> Option<Arc<V>> {
        self.purge();
        self.map
            .insert(key, Arc::downgrade(value))
            .and_then(|old| old.upgrade())
    }

    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        self.purge();
        let value = self.map.get(key)?.upgrade();
        if value.is_none() {
            self.map.remove(key);
        }
        value
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        self.purge();
        self.map.remove(key).and_then(|weak| weak.upgrade())
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Live values. Dead entries met along the way are dropped.
    pub fn values(&mut self) -> Vec<Arc<V>> {
        self.purge();
        let mut live = Vec::with_capacity(self.map.len());
        self.map.retain(|_, weak| match weak.upgrade() {
            Some(value) => {
                live.push(value);
                true
            }
            None => false,
        });
        live
    }

    /// Number of entries after draining the reclaim queue.
    pub fn len(&mut self) -> usize {
        self.purge();
        self.map.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Entries currently held, including ones not yet purged.
    pub fn raw_len(&self) -> usize {
        self.map.len()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        while self.reclaimed.pop().is_some() {}
    }
}
