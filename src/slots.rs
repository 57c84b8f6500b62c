//! Worker-slot allocation for report grouping.
//!
//! Concurrently running scenarios get a small integer "worker" label. Slots
//! freed by finished scenarios are reused, smallest first, so the labels stay
//! dense and reproducible for a given interleaving.

use std::collections::BTreeMap;

/// Slot busy-table. Not synchronized; the scenario tracker owns it behind
/// its lock.
#[derive(Debug, Default)]
pub struct SlotAllocator {
    /// Highest slot number ever allocated.
    created: u32,
    /// Slot number to busy flag.
    busy: BTreeMap<u32, bool>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the smallest free slot, or a new one numbered after the highest
    /// ever allocated.
    pub fn acquire(&mut self) -> u32 {
        if let Some((&slot, flag)) = self.busy.iter_mut().find(|(_, busy)| !**busy) {
            *flag = true;
            return slot;
        }

        self.created += 1;
        self.busy.insert(self.created, true);
        self.created
    }

    /// Mark `slot` free. Returns `false` if it was not busy.
    pub fn release(&mut self, slot: u32) -> bool {
        match self.busy.get_mut(&slot) {
            Some(flag) if *flag => {
                *flag = false;
                true
            }
            _ => false,
        }
    }

    /// Number of slots ever created.
    pub fn created(&self) -> u32 {
        self.created
    }

    /// Number of slots currently busy.
    pub fn in_use(&self) -> usize {
        self.busy.values().filter(|busy| **busy).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocation() {
        let mut slots = SlotAllocator::new();
        assert_eq!(slots.acquire(), 1);
        assert_eq!(slots.acquire(), 2);
        assert_eq!(slots.acquire(), 3);
        assert_eq!(slots.created(), 3);
        assert_eq!(slots.in_use(), 3);
    }

    #[test]
    fn test_released_slot_is_reused() {
        let mut slots = SlotAllocator::new();
        let a = slots.acquire();
        let b = slots.acquire();
        assert!(slots.release(a));

        assert_eq!(slots.acquire(), a);
        assert_eq!(slots.acquire(), 3);
        assert_ne!(a, b);
        assert_eq!(slots.created(), 3);
    }

    #[test]
    fn test_smallest_free_slot_first() {
        let mut slots = SlotAllocator::new();
        for _ in 0..4 {
            slots.acquire();
        }
        slots.release(3);
        slots.release(2);

        assert_eq!(slots.acquire(), 2);
        assert_eq!(slots.acquire(), 3);
        assert_eq!(slots.acquire(), 5);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut slots = SlotAllocator::new();
        let a = slots.acquire();
        assert!(slots.release(a));
        assert!(!slots.release(a));
        assert!(!slots.release(42));
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn test_busy_slot_never_double_assigned() {
        let mut slots = SlotAllocator::new();
        let mut held = Vec::new();
        for round in 0..50u32 {
            held.push(slots.acquire());
            if round % 3 == 0 {
                let slot = held.remove(0);
                slots.release(slot);
            }
            let mut sorted = held.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), held.len(), "slot handed out twice");
        }
    }
}
