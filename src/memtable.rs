use crossbeam_skiplist::SkipMap;
use std::ops::Bound;

use crate::types::{Entry, Key, Value};

/// Outcome of a memtable insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was added.
    Inserted,
    /// An existing entry's value was replaced; occupancy is unchanged.
    Updated,
    /// The memtable is at capacity and the key was not present.
    Full,
}

/// Bounded, key-unique ordered map absorbing writes before they are
/// flushed. Tombstones are stored as ordinary entries carrying the
/// sentinel value.
#[derive(Debug)]
pub struct Memtable {
    data: SkipMap<Key, Value>,
    len: usize,
    capacity: usize,
}

impl Memtable {
    /// Creates an empty memtable holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: SkipMap::new(),
            len: 0,
            capacity,
        }
    }

    /// Inserts or replaces a pair. Replacement succeeds even at capacity.
    pub fn insert(&mut self, key: Key, value: Value) -> InsertOutcome {
        if self.data.contains_key(&key) {
            self.data.insert(key, value);
            return InsertOutcome::Updated;
        }
        if self.len >= self.capacity {
            return InsertOutcome::Full;
        }
        self.data.insert(key, value);
        self.len += 1;
        InsertOutcome::Inserted
    }

    /// Retrieves the value for a given key.
    pub fn get(&self, key: Key) -> Option<Value> {
        self.data.get(&key).map(|entry| *entry.value())
    }

    /// Returns all pairs with `lo <= key <= hi` in ascending key order.
    pub fn range(&self, lo: Key, hi: Key) -> Vec<Entry> {
        self.data
            .range((Bound::Included(lo), Bound::Included(hi)))
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Smallest key, if any.
    pub fn first_key(&self) -> Option<Key> {
        self.data.front().map(|entry| *entry.key())
    }

    /// Largest key, if any.
    pub fn last_key(&self) -> Option<Key> {
        self.data.back().map(|entry| *entry.key())
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops all entries, keeping the capacity.
    pub fn clear(&mut self) {
        self.data = SkipMap::new();
        self.len = 0;
    }
}
