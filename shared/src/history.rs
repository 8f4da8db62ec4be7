//! Bounded, sequence-keyed history used by client prediction
//!
//! Entries are ordered by sequence number so replay can walk them strictly
//! ascending. The buffer is bounded: once `capacity` is exceeded the oldest
//! entries are evicted regardless of whether the server has acknowledged them.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct History<T> {
    entries: BTreeMap<u32, T>,
    capacity: usize,
}

impl<T> History<T> {
    /// Creates an empty history holding at most `capacity` entries.
    ///
    /// A zero capacity is treated as one so the most recent entry always
    /// survives its own insertion.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or overwrites the entry for `sequence`, then evicts the oldest
    /// entries beyond capacity. Returns how many entries were evicted.
    pub fn insert(&mut self, sequence: u32, value: T) -> usize {
        self.entries.insert(sequence, value);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if self.entries.pop_first().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    pub fn get(&self, sequence: u32) -> Option<&T> {
        self.entries.get(&sequence)
    }

    pub fn get_mut(&mut self, sequence: u32) -> Option<&mut T> {
        self.entries.get_mut(&sequence)
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Removes every entry with a sequence number `<= sequence`.
    pub fn prune_through(&mut self, sequence: u32) -> usize {
        let before = self.entries.len();
        self.entries = match sequence.checked_add(1) {
            Some(first_kept) => self.entries.split_off(&first_kept),
            None => BTreeMap::new(),
        };
        before - self.entries.len()
    }

    /// Entries strictly newer than `sequence`, oldest first.
    pub fn after(&self, sequence: u32) -> impl Iterator<Item = (u32, &T)> + '_ {
        let start = sequence.checked_add(1);
        self.entries
            .range(start.unwrap_or(u32::MAX)..)
            .filter(move |_| start.is_some())
            .map(|(seq, value)| (*seq, value))
    }

    pub fn oldest_sequence(&self) -> Option<u32> {
        self.entries.keys().next().copied()
    }

    pub fn latest_sequence(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
