//! Device slot table
//!
//! Open devices live in a fixed-size arena. A handle carries the slot index
//! plus the generation the slot had when the device was inserted, so a
//! handle kept past `close` stays invalid after the slot is reused.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Generation-counted reference to an open capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureHandle {
    index: u32,
    generation: u32,
}

impl CaptureHandle {
    /// Slot index, stable for the lifetime of the device
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<Arc<T>>,
}

/// Slot arena with a free list
pub(crate) struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    limit: usize,
}

impl<T> SlotTable<T> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            limit,
        }
    }

    /// Insert an entry built from its future handle. Returns `None` when
    /// the table is full.
    pub(crate) fn insert_with<F>(&mut self, make: F) -> Option<(CaptureHandle, Arc<T>)>
    where
        F: FnOnce(CaptureHandle) -> T,
    {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < self.limit => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                self.slots.len() - 1
            }
            None => return None,
        };

        let slot = &mut self.slots[index];
        let handle = CaptureHandle {
            index: index as u32,
            generation: slot.generation,
        };
        let entry = Arc::new(make(handle));
        slot.entry = Some(entry.clone());
        Some((handle, entry))
    }

    pub(crate) fn get(&self, handle: CaptureHandle) -> Option<Arc<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.clone())
    }

    /// Take the entry out and retire the handle
    pub(crate) fn remove(&mut self, handle: CaptureHandle) -> Option<Arc<T>> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        Some(entry)
    }

    /// Live entries in slot order
    pub(crate) fn entries(&self) -> Vec<Arc<T>> {
        self.slots.iter().filter_map(|slot| slot.entry.clone()).collect()
    }

    pub(crate) fn handles(&self) -> Vec<CaptureHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(index, slot)| CaptureHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = SlotTable::new(4);
        let (handle, entry) = table.insert_with(|h| h.index() * 10).unwrap();
        assert_eq!(*entry, 0);
        assert_eq!(table.get(handle).as_deref(), Some(&0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut table = SlotTable::new(4);
        let (first, _) = table.insert_with(|_| "a").unwrap();
        assert!(table.remove(first).is_some());
        let (second, _) = table.insert_with(|_| "b").unwrap();

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());
        assert_eq!(table.get(second).as_deref(), Some(&"b"));
    }

    #[test]
    fn test_limit() {
        let mut table = SlotTable::new(2);
        assert!(table.insert_with(|_| 1).is_some());
        assert!(table.insert_with(|_| 2).is_some());
        assert!(table.insert_with(|_| 3).is_none());
        assert_eq!(table.limit(), 2);
    }

    #[test]
    fn test_entries_skip_free_slots() {
        let mut table = SlotTable::new(4);
        let (a, _) = table.insert_with(|_| 'a').unwrap();
        table.insert_with(|_| 'b').unwrap();
        table.remove(a);
        let live: Vec<char> = table.entries().iter().map(|e| **e).collect();
        assert_eq!(live, vec!['b']);
        assert_eq!(table.handles().len(), 1);
    }
}
