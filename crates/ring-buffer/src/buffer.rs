//! Slot Ring Implementation

use crate::RingError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of DMA slots
pub const DEFAULT_SLOTS: usize = 8;

/// Ownership state of a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Owned by the transport, waiting to be filled
    Free,
    /// Holds a completed frame not yet seen by software
    Queued,
    /// Lent to software until enqueued again
    Dequeued,
}

/// Buffer accounting counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStats {
    /// Frames written into a free slot
    pub filled: u64,
    /// Frames lost because no slot was free
    pub overruns: u64,
    /// Frames lent to software
    pub dequeued: u64,
    /// Frames handed back by software
    pub enqueued: u64,
    /// Highest number of slots lent out at once
    pub max_outstanding: usize,
}

/// A completed frame lent to software
#[derive(Debug)]
pub struct Dequeued<T> {
    pub slot: usize,
    pub payload: T,
    /// Completed frames still queued behind this one
    pub frames_behind: usize,
}

struct Slot<T> {
    state: SlotState,
    payload: Option<T>,
}

/// Fixed-capacity frame ring. Frames come out in fill order.
pub struct DmaRing<T> {
    slots: Box<[Slot<T>]>,
    queue: VecDeque<usize>,
    next_fill: usize,
    outstanding: usize,
    stats: RingStats,
}

impl<T> DmaRing<T> {
    /// Create a ring with `capacity` free slots
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot {
                state: SlotState::Free,
                payload: None,
            })
            .collect();
        Ok(Self {
            slots: slots.into_boxed_slice(),
            queue: VecDeque::with_capacity(capacity),
            next_fill: 0,
            outstanding: 0,
            stats: RingStats::default(),
        })
    }

    /// Fill the next free slot. `make` receives the payload last stored in
    /// that slot so its allocation can be reused. Returns `None` (and counts
    /// an overrun) when every slot is busy.
    pub fn fill_with<F>(&mut self, make: F) -> Option<usize>
    where
        F: FnOnce(Option<T>) -> T,
    {
        let capacity = self.slots.len();
        let slot = (0..capacity)
            .map(|i| (self.next_fill + i) % capacity)
            .find(|&i| self.slots[i].state == SlotState::Free);

        let Some(slot) = slot else {
            self.stats.overruns += 1;
            return None;
        };

        let entry = &mut self.slots[slot];
        entry.payload = Some(make(entry.payload.take()));
        entry.state = SlotState::Queued;
        self.queue.push_back(slot);
        self.next_fill = (slot + 1) % capacity;
        self.stats.filled += 1;
        Some(slot)
    }

    /// Fill the next free slot with `payload`
    pub fn fill(&mut self, payload: T) -> Option<usize> {
        self.fill_with(|_| payload)
    }

    /// Lend the oldest completed frame to software
    pub fn dequeue(&mut self) -> Option<Dequeued<T>> {
        let slot = self.queue.pop_front()?;
        let entry = &mut self.slots[slot];
        let payload = entry.payload.take()?;
        entry.state = SlotState::Dequeued;

        self.outstanding += 1;
        self.stats.dequeued += 1;
        self.stats.max_outstanding = self.stats.max_outstanding.max(self.outstanding);

        Some(Dequeued {
            slot,
            payload,
            frames_behind: self.queue.len(),
        })
    }

    /// Return a lent frame so its slot can be filled again
    pub fn enqueue(&mut self, slot: usize, payload: T) -> Result<(), RingError> {
        let capacity = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(RingError::InvalidSlot { slot, capacity })?;

        if entry.state != SlotState::Dequeued {
            return Err(RingError::NotDequeued {
                slot,
                state: entry.state,
            });
        }

        entry.state = SlotState::Free;
        entry.payload = Some(payload);
        self.outstanding -= 1;
        self.stats.enqueued += 1;
        Ok(())
    }

    /// Drop all queued frames and hand every slot back to the transport.
    /// Returns how many slots were still lent to software.
    pub fn reset(&mut self) -> usize {
        let lent = self.outstanding;
        self.queue.clear();
        for entry in self.slots.iter_mut() {
            entry.state = SlotState::Free;
        }
        self.outstanding = 0;
        self.next_fill = 0;
        lent
    }

    /// Number of completed frames waiting to be dequeued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no completed frame is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of slots in the ring
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently lent to software
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// State of a single slot
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    /// Accounting counters since creation
    pub fn stats(&self) -> RingStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fill_and_dequeue_in_order() {
        let mut ring = DmaRing::new(4).unwrap();
        for i in 0..3u32 {
            ring.fill(i).unwrap();
        }

        assert_eq!(ring.len(), 3);

        let first = ring.dequeue().unwrap();
        assert_eq!(first.payload, 0);
        assert_eq!(first.frames_behind, 2);

        let second = ring.dequeue().unwrap();
        assert_eq!(second.payload, 1);
        assert_eq!(second.frames_behind, 1);
    }

    #[test]
    fn test_overrun_when_all_slots_busy() {
        let mut ring = DmaRing::new(2).unwrap();
        assert!(ring.fill(1u8).is_some());
        assert!(ring.fill(2u8).is_some());
        assert!(ring.fill(3u8).is_none());

        let stats = ring.stats();
        assert_eq!(stats.filled, 2);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn test_double_enqueue_rejected() {
        let mut ring = DmaRing::new(2).unwrap();
        ring.fill(7u8);
        let frame = ring.dequeue().unwrap();
        ring.enqueue(frame.slot, frame.payload).unwrap();

        let err = ring.enqueue(frame.slot, 7).unwrap_err();
        assert_eq!(
            err,
            RingError::NotDequeued {
                slot: frame.slot,
                state: SlotState::Free
            }
        );
    }

    #[test]
    fn test_recycled_buffer_reused() {
        let mut ring = DmaRing::new(1).unwrap();
        ring.fill(vec![0u8; 16]);
        let frame = ring.dequeue().unwrap();
        let ptr = frame.payload.as_ptr();
        ring.enqueue(frame.slot, frame.payload).unwrap();

        ring.fill_with(|recycled| {
            let buf = recycled.unwrap();
            assert_eq!(buf.as_ptr(), ptr);
            buf
        });
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_reset_reports_lent_slots() {
        let mut ring = DmaRing::new(3).unwrap();
        ring.fill(1u8);
        ring.fill(2u8);
        let _lent = ring.dequeue().unwrap();

        assert_eq!(ring.reset(), 1);
        assert!(ring.is_empty());
        assert_eq!(ring.slot_state(0), Some(SlotState::Free));
        assert_eq!(ring.outstanding(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(DmaRing::<u8>::new(0), Err(RingError::ZeroCapacity)));
    }

    proptest! {
        #[test]
        fn prop_slot_states_partition_ring(ops in proptest::collection::vec(0u8..3, 0..200)) {
            let mut ring = DmaRing::new(5).unwrap();
            let mut lent = Vec::new();

            for op in ops {
                match op {
                    0 => { ring.fill(0u32); }
                    1 => { if let Some(f) = ring.dequeue() { lent.push(f); } }
                    _ => { if let Some(f) = lent.pop() { ring.enqueue(f.slot, f.payload).unwrap(); } }
                }

                let queued = (0..5).filter(|&i| ring.slot_state(i) == Some(SlotState::Queued)).count();
                let dequeued = (0..5).filter(|&i| ring.slot_state(i) == Some(SlotState::Dequeued)).count();
                prop_assert_eq!(queued, ring.len());
                prop_assert_eq!(dequeued, lent.len());
                prop_assert!(queued + dequeued <= ring.capacity());

                let stats = ring.stats();
                prop_assert_eq!(stats.dequeued - stats.enqueued, lent.len() as u64);
            }
        }
    }
}
