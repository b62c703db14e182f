//! Dual-keyed collection: unique primary id, non-unique secondary key.
//!
//! Client-side waiters and timers are indexed by their id (for cancel)
//! and by their due tick (for expiry). Primary lookups are O(1). The
//! secondary side is a scan over distinct keys, not an ordered structure:
//! fine at the waiter counts a client holds, but it has no sorted-min.

use std::hash::Hash;

use indexmap::IndexMap;
use smallvec::SmallVec;

/// An item that can live in a [`Bimap`].
pub trait BimapItem {
    /// Non-unique secondary key, typically a due tick.
    type Secondary: Copy + Eq + Hash + Ord;

    /// Unique primary key.
    fn primary(&self) -> u64;

    /// Secondary key. Must not change while the item is in a map.
    fn secondary(&self) -> Self::Secondary;
}

/// Collection indexed by a unique `u64` id and a non-unique secondary key.
pub struct Bimap<T: BimapItem> {
    primary: IndexMap<u64, T>,
    secondary: IndexMap<T::Secondary, SmallVec<[u64; 4]>>,
}

impl<T: BimapItem> Default for Bimap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BimapItem> Bimap<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            primary: IndexMap::new(),
            secondary: IndexMap::new(),
        }
    }

    /// Insert `item`. Returns `false` (and drops nothing) if its primary
    /// key is already present; existing entries are never overwritten.
    pub fn add(&mut self, item: T) -> bool {
        let id = item.primary();
        if self.primary.contains_key(&id) {
            return false;
        }
        self.secondary.entry(item.secondary()).or_default().push(id);
        self.primary.insert(id, item);
        true
    }

    /// Look up an item by primary key.
    pub fn get(&self, id: u64) -> Option<&T> {
        self.primary.get(&id)
    }

    /// Whether an item with this primary key is present.
    pub fn contains(&self, id: u64) -> bool {
        self.primary.contains_key(&id)
    }

    /// Remove an item by primary key, unlinking it from its secondary
    /// bucket and dropping the bucket once empty.
    pub fn remove(&mut self, id: u64) -> Option<T> {
        let item = self.primary.swap_remove(&id)?;
        let key = item.secondary();
        if let Some(bucket) = self.secondary.get_mut(&key) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.secondary.shift_remove(&key);
            }
        }
        Some(item)
    }

    /// Apply `action` to every item whose secondary key satisfies `matches`.
    pub fn for_each_secondary<M, A>(&self, mut matches: M, mut action: A)
    where
        M: FnMut(T::Secondary) -> bool,
        A: FnMut(&T),
    {
        for (key, ids) in &self.secondary {
            if !matches(*key) {
                continue;
            }
            for id in ids {
                if let Some(item) = self.primary.get(id) {
                    action(item);
                }
            }
        }
    }

    /// Remove and return every item whose secondary key satisfies
    /// `matches`, ordered by secondary key and then by id.
    pub fn drain_secondary<M>(&mut self, matches: M) -> Vec<T>
    where
        M: FnMut(T::Secondary) -> bool,
    {
        let mut ids = Vec::new();
        self.for_each_secondary(matches, |item| ids.push((item.secondary(), item.primary())));
        ids.sort_unstable();
        ids.into_iter().filter_map(|(_, id)| self.remove(id)).collect()
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.primary.clear();
        self.secondary.clear();
    }

    /// Remove and return every item, ordered by id.
    pub fn take_all(&mut self) -> Vec<T> {
        self.secondary.clear();
        let mut items: Vec<T> = self.primary.drain(..).map(|(_, item)| item).collect();
        items.sort_unstable_by_key(|item| item.primary());
        items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Whether the map holds no items.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Number of distinct secondary keys.
    pub fn secondary_len(&self) -> usize {
        self.secondary.len()
    }
}
