//! DMA Slot Ring
//!
//! Fixed pool of frame-sized slots cycling between the transport (which
//! fills them) and software (which borrows completed frames and hands them
//! back). Every slot is in exactly one state at any time.

mod buffer;

pub use buffer::{Dequeued, DmaRing, RingStats, SlotState, DEFAULT_SLOTS};

use thiserror::Error;

/// Ring ownership violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// A ring needs at least one slot
    #[error("ring capacity must be at least one slot")]
    ZeroCapacity,

    /// Slot index does not exist
    #[error("slot {slot} out of range (capacity {capacity})")]
    InvalidSlot { slot: usize, capacity: usize },

    /// Slot was returned without being lent out first
    #[error("slot {slot} is not lent to software (state {state:?})")]
    NotDequeued { slot: usize, state: SlotState },
}
