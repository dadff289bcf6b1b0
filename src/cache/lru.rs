use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::hash::Hash;

/// Capacity-bounded map with least-recently-used eviction.
///
/// Recency is updated on both lookup and insertion. Capacity 0 is a valid
/// degenerate state in which `insert` is a no-op. Repositioning in the order
/// queue is O(n); caches here hold tile slots, not pixels, so n stays small.
#[derive(Debug)]
pub struct LruMap<K, V> {
    capacity: usize,
    map: FxHashMap<K, V>,
    /// Least recently used at the front, most recent at the back.
    order: VecDeque<K>,
}

impl<K: Hash + Eq + Clone, V> LruMap<K, V> {
    /// Empty map that will hold at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.map.len(), self.order.len());
        self.map.len()
    }

    /// Return `true` when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of resident entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_over(&mut self, limit: usize) {
        while self.len() > limit {
            if let Some(lru) = self.order.pop_front() {
                self.map.remove(&lru);
            }
        }
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    /// Change the capacity, evicting LRU-first when shrinking. Capacity 0
    /// clears the map.
    pub fn recapacitate(&mut self, capacity: usize) {
        if self.capacity == capacity {
            return;
        }
        self.capacity = capacity;
        if capacity == 0 {
            self.map.clear();
            self.order.clear();
        } else {
            self.evict_over(capacity);
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get(key)
    }

    /// Like [`LruMap::get`] with a mutable result.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get_mut(key)
    }

    /// Membership test that also marks the key most recently used.
    pub fn contains(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert an entry as most recently used, evicting LRU entries until the
    /// capacity holds. Inserting a present key replaces its value.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.map.contains_key(&key) {
            self.touch(&key);
            self.map.insert(key, value);
            return;
        }
        self.evict_over(self.capacity - 1);
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    /// Visit resident entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order.iter().filter_map(|k| self.map.get_key_value(k))
    }
}
