//! Replay buffer over completed tasks' training patches.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::data::PatchRecord;

/// Fixed-capacity reservoir over the stream of past training patches.
///
/// Reservoir sampling keeps every patch seen so far with equal
/// probability, so no country dominates the buffer regardless of task
/// order. Capacity 0 disables replay.
#[derive(Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    seen: usize,
    items: Vec<PatchRecord>,
    rng: StdRng,
}

impl ReplayBuffer {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Offers one patch to the reservoir.
    pub fn push(&mut self, record: PatchRecord) {
        if self.capacity == 0 {
            return;
        }

        if self.items.len() < self.capacity {
            self.items.push(record);
        } else {
            let j = self.rng.random_range(0..=self.seen);
            if j < self.capacity {
                self.items[j] = record;
            }
        }
        self.seen += 1;
    }

    /// Offers every patch of a completed task.
    pub fn extend<I: IntoIterator<Item = PatchRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    pub fn as_slice(&self) -> &[PatchRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total patches offered so far.
    pub fn seen(&self) -> usize {
        self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Split;

    fn record(id: usize, country: &str) -> PatchRecord {
        PatchRecord {
            patch_id: format!("p{id}"),
            country: country.to_string(),
            split: Split::Train,
            snowy: false,
            cloudy: false,
            labels: vec![false; crate::data::NUM_CLASSES],
        }
    }

    #[test]
    fn fills_up_to_capacity() {
        let mut buffer = ReplayBuffer::new(5, 42);
        buffer.extend((0..3).map(|i| record(i, "Ireland")));
        assert_eq!(buffer.len(), 3);
        buffer.extend((3..20).map(|i| record(i, "Portugal")));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.seen(), 20);
    }

    #[test]
    fn zero_capacity_disables_replay() {
        let mut buffer = ReplayBuffer::new(0, 42);
        buffer.extend((0..10).map(|i| record(i, "Ireland")));
        assert!(buffer.is_empty());
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let mut a = ReplayBuffer::new(4, 7);
        let mut b = ReplayBuffer::new(4, 7);
        for i in 0..50 {
            a.push(record(i, "Ireland"));
            b.push(record(i, "Ireland"));
        }
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn late_items_can_displace_early_ones() {
        let mut buffer = ReplayBuffer::new(2, 7);
        for i in 0..200 {
            buffer.push(record(i, "Ireland"));
        }
        // With 200 offers into 2 slots, at least one early item must
        // have been displaced.
        assert!(buffer.as_slice().iter().any(|r| r.patch_id != "p0" && r.patch_id != "p1"));
    }
}
