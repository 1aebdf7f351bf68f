//! Keyed concurrent containers backing the memory cache.
//!
//! Each container sits behind a single readers-writer lock: readers proceed in
//! parallel, writers exclude everyone. Borrowing accessors hand back mapped
//! read guards so a caller can walk a large list or inner map without copying;
//! the outer lock is released when the guard drops.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::hash::Hash;

/// Single-value map `K -> V`.
#[derive(Debug)]
pub struct RwLockMap<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for RwLockMap<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> RwLockMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    pub fn key_set(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn clone_map(&self) -> HashMap<K, V> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Return the value at `key`, creating it with `make` if absent.
    ///
    /// The flag is true only for the one caller whose value was inserted, so
    /// concurrent callers all observe the same instance.
    pub fn get_or_insert_with(&self, key: &K, make: impl FnOnce() -> V) -> (V, bool) {
        if let Some(existing) = self.lookup(key) {
            return (existing, false);
        }
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            return (existing.clone(), false);
        }
        let value = make();
        entries.insert(key.clone(), value.clone());
        (value, true)
    }

    /// Replace the value at `key` with `update(current)`.
    pub fn upsert(&self, key: K, update: impl FnOnce(Option<&V>) -> V) {
        let mut entries = self.entries.write();
        let next = update(entries.get(&key));
        entries.insert(key, next);
    }
}

/// Append-list map `K -> [V]`.
#[derive(Debug)]
pub struct RwLockMapArray<K, V> {
    entries: RwLock<HashMap<K, Vec<V>>>,
}

impl<K, V> Default for RwLockMapArray<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> RwLockMapArray<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the list at `key`. The map stays read-locked while the guard lives.
    pub fn lookup(&self, key: &K) -> Option<MappedRwLockReadGuard<'_, [V]>> {
        RwLockReadGuard::try_map(self.entries.read(), |entries| {
            entries.get(key).map(|list| list.as_slice())
        })
        .ok()
    }

    pub fn lookup_copy(&self, key: &K) -> Vec<V> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Copy of the last `n` entries, newest first. `n` past the end is clamped.
    pub fn lookup_last_n(&self, key: &K, n: usize) -> Vec<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(list) => list.iter().rev().take(n).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.write().entry(key).or_default().push(value);
    }

    /// Insert keeping the list ascending under `less`.
    ///
    /// Scans from the tail, so near-sorted streams insert in O(1). The new value
    /// lands after every element it is not strictly less than, so equal
    /// elements keep their insertion order.
    pub fn insert_sorted(&self, key: K, value: V, less: impl Fn(&V, &V) -> bool) {
        let mut entries = self.entries.write();
        let list = entries.entry(key).or_default();
        let mut idx = list.len();
        while idx > 0 && less(&value, &list[idx - 1]) {
            idx -= 1;
        }
        list.insert(idx, value);
    }
}

/// Two-level map `K -> K2 -> V`.
#[derive(Debug)]
pub struct RwLockMapMap<K, K2, V> {
    entries: RwLock<HashMap<K, HashMap<K2, V>>>,
}

impl<K, K2, V> Default for RwLockMapMap<K, K2, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, K2: Eq + Hash + Clone, V: Clone> RwLockMapMap<K, K2, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_set(&self, key: &K) -> HashMap<K2, V> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    pub fn insert(&self, key: K, inner_key: K2, value: V) {
        self.entries
            .write()
            .entry(key)
            .or_default()
            .insert(inner_key, value);
    }

    /// Borrow the inner map at `key` under the outer read lock.
    ///
    /// Returns `None` if the key was never inserted. Holders must not try to
    /// write to this map until the guard drops.
    pub fn borrow_set(&self, key: &K) -> Option<MappedRwLockReadGuard<'_, HashMap<K2, V>>> {
        RwLockReadGuard::try_map(self.entries.read(), |entries| entries.get(key)).ok()
    }
}
