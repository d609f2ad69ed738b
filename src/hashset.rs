//! Insert-only open-addressing table of aggregation buckets.
//!
//! Buckets are located by a 64-bit hash and confirmed by comparing the full
//! key bytes, which live in the arena. Probing is triangular
//! (`h, h+1, h+3, h+6, ...`), which on a power-of-two table visits every slot
//! exactly once per `capacity` probes. Since nothing is ever deleted, an empty
//! slot ends a lookup.

use crate::arena::{Arena, ArenaSlice};

/// Capacity of a fresh table.
pub const INITIAL_CAPACITY: usize = 16;

/// One occupied slot: the key and the per-column state region of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Hash of the key bytes, kept for rehashing.
    pub hash: u64,
    pub key: ArenaSlice,
    pub value: ArenaSlice,
}

#[derive(Debug)]
pub struct OpenHashSet {
    table: Vec<Option<Bucket>>,
    count: usize,
    rehashes: u32,
    longest_probe: usize,
}

impl Default for OpenHashSet {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}

#[inline]
fn slot(hash: u64, probe: usize, mask: usize) -> usize {
    (hash as usize).wrapping_add(probe * (probe + 1) / 2) & mask
}

impl OpenHashSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with at least `capacity` slots, rounded up to a power of two.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: vec![None; capacity.max(2).next_power_of_two()],
            count: 0,
            rehashes: 0,
            longest_probe: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// Number of times the table doubled.
    #[must_use]
    pub fn rehash_count(&self) -> u32 {
        self.rehashes
    }

    /// Longest probe sequence an insertion needed.
    #[must_use]
    pub fn longest_probe(&self) -> usize {
        self.longest_probe
    }

    /// Look up the bucket whose key bytes equal `key`.
    pub fn find<A: Arena + ?Sized>(&self, arena: &A, hash: u64, key: &[u8]) -> Option<Bucket> {
        let mask = self.table.len() - 1;
        for probe in 0..self.table.len() {
            let bucket = self.table[slot(hash, probe, mask)]?;
            if bucket.hash == hash && arena.get(bucket.key) == key {
                return Some(bucket);
            }
        }
        None
    }

    /// Add a bucket whose key is not in the table yet.
    pub fn insert(&mut self, bucket: Bucket) {
        if (self.count + 1) * 10 > self.table.len() * 7 {
            self.grow();
        }
        let probes = Self::place(&mut self.table, bucket);
        self.longest_probe = self.longest_probe.max(probes);
        self.count += 1;
    }

    // The load factor stays below 1, so an empty slot is always reached.
    fn place(table: &mut [Option<Bucket>], bucket: Bucket) -> usize {
        let mask = table.len() - 1;
        let mut probe = 0;
        loop {
            let i = slot(bucket.hash, probe, mask);
            if table[i].is_none() {
                table[i] = Some(bucket);
                return probe;
            }
            probe += 1;
        }
    }

    fn grow(&mut self) {
        let mut table = vec![None; self.table.len() * 2];
        for bucket in self.table.iter().flatten() {
            Self::place(&mut table, *bucket);
        }
        self.table = table;
        self.rehashes += 1;
        log::trace!("hash table grown to {} slots", self.table.len());
    }

    /// Occupied buckets in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Bucket> + '_ {
        self.table.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangular_probe_covers_every_slot() {
        for cap in [2usize, 16, 1024] {
            let mut seen = vec![false; cap];
            for probe in 0..cap {
                seen[slot(7, probe, cap - 1)] = true;
            }
            assert!(seen.iter().all(|s| *s), "capacity {cap}");
        }
    }

    #[test]
    fn load_factor_stays_below_ceiling() {
        let mut set = OpenHashSet::new();
        for i in 0..100u64 {
            set.insert(Bucket {
                hash: i,
                key: ArenaSlice::default(),
                value: ArenaSlice::default(),
            });
            assert!(set.len() * 10 <= set.capacity() * 7);
        }
        assert_eq!(set.capacity(), 256);
        assert_eq!(set.rehash_count(), 4);
    }
}
