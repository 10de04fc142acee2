//! A from-scratch open-addressing hash table, used as the per-lane
//! write-side scratch space for the hash and fixed-hash container
//! variants: linear probing, power-of-two capacity, resize at 50% load.

use std::hash::Hash;

enum Slot<K, C> {
    Empty,
    Occupied(K, C),
}

pub struct OpenHashTable<K, C> {
    slots: Vec<Slot<K, C>>,
    len: usize,
}

impl<K: Eq + Hash, C> OpenHashTable<K, C> {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Empty);
        Self { slots, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn index_of(&self, key: &K) -> usize {
        use std::hash::Hasher;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (self.slots.len() - 1)
    }

    /// Get a mutable reference to the combiner for `key`, inserting a
    /// fresh one via `default` if absent. Resizes first if load would
    /// exceed 50%.
    pub fn entry_or_insert_with(&mut self, key: K, default: impl FnOnce() -> C) -> &mut C {
        if (self.len + 1) * 2 > self.slots.len() {
            self.grow();
        }
        let mut idx = self.index_of(&key);
        loop {
            match &self.slots[idx] {
                Slot::Empty => {
                    self.slots[idx] = Slot::Occupied(key, default());
                    self.len += 1;
                    break;
                }
                Slot::Occupied(k, _) if *k == key => break,
                Slot::Occupied(_, _) => {
                    idx = (idx + 1) & (self.slots.len() - 1);
                }
            }
        }
        match &mut self.slots[idx] {
            Slot::Occupied(_, c) => c,
            Slot::Empty => unreachable!("just inserted"),
        }
    }

    fn grow(&mut self) {
        let new_capacity = (self.slots.len() * 2).max(1);
        let mut new_slots = Vec::with_capacity(new_capacity);
        new_slots.resize_with(new_capacity, || Slot::Empty);
        let old = std::mem::replace(&mut self.slots, new_slots);
        self.len = 0;
        for slot in old {
            if let Slot::Occupied(k, c) = slot {
                let idx_mask = self.slots.len() - 1;
                let mut idx = {
                    use std::hash::Hasher;
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    k.hash(&mut hasher);
                    (hasher.finish() as usize) & idx_mask
                };
                while matches!(self.slots[idx], Slot::Occupied(_, _)) {
                    idx = (idx + 1) & idx_mask;
                }
                self.slots[idx] = Slot::Occupied(k, c);
                self.len += 1;
            }
        }
    }

    /// Drain every `(key, combiner)` pair out of the table.
    pub fn into_entries(self) -> Vec<(K, C)> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(k, c) => Some((k, c)),
                Slot::Empty => None,
            })
            .collect()
    }
}

impl<K: Eq + Hash, C> Default for OpenHashTable<K, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_and_updates_same_key() {
        let mut t: OpenHashTable<&str, i32> = OpenHashTable::new();
        *t.entry_or_insert_with("a", || 0) += 1;
        *t.entry_or_insert_with("a", || 0) += 1;
        *t.entry_or_insert_with("b", || 0) += 5;
        assert_eq!(t.len(), 2);
        let entries: std::collections::HashMap<_, _> = t.into_entries().into_iter().collect();
        assert_eq!(entries["a"], 2);
        assert_eq!(entries["b"], 5);
    }

    #[test]
    fn grows_past_half_load_without_losing_entries() {
        let mut t: OpenHashTable<i32, i32> = OpenHashTable::with_capacity(2);
        for i in 0..100 {
            *t.entry_or_insert_with(i, || 0) = i;
        }
        assert_eq!(t.len(), 100);
        let entries: std::collections::HashMap<_, _> = t.into_entries().into_iter().collect();
        for i in 0..100 {
            assert_eq!(entries[&i], i);
        }
    }
}
