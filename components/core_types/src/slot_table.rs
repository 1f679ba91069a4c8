//! Generational slot storage.
//!
//! Every registry in the bridge (objects, functions, modules, script classes)
//! and the engine heap store their entries in a [`SlotTable`]. Freed slots bump
//! their generation so stale ids are detected instead of aliasing new entries.

use crate::SlotId;
use std::fmt;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A vector of reusable slots addressed by [`SlotId`].
///
/// # Examples
///
/// ```
/// use core_types::SlotTable;
///
/// let mut table = SlotTable::new();
/// let a = table.insert("a");
/// assert_eq!(table.get(a), Some(&"a"));
///
/// table.remove(a);
/// let b = table.insert("b");
/// assert_eq!(a.index(), b.index());
/// assert_eq!(table.get(a), None);
/// ```
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T: fmt::Debug> fmt::Debug for SlotTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty table with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value` and returns its id.
    pub fn insert(&mut self, value: T) -> SlotId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SlotId::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        SlotId::from_parts(index, 0)
    }

    /// Returns the entry for `id` if it is still live.
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    /// Returns the entry for `id` mutably if it is still live.
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Returns whether `id` refers to a live entry.
    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Removes and returns the entry for `id`. Stale ids return `None`.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id of the live entry with the lowest index.
    pub fn first_id(&self) -> Option<SlotId> {
        self.iter().next().map(|(id, _)| id)
    }

    /// Iterates over live entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (SlotId::from_parts(index as u32, slot.generation), value))
        })
    }

    /// Iterates mutably over live entries in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (SlotId::from_parts(index as u32, generation), value))
        })
    }

    /// Ids of all live entries.
    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Removes every entry for which `keep` returns false and returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(SlotId, &mut T) -> bool) -> usize {
        let mut removed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let id = SlotId::from_parts(index as u32, slot.generation);
            let drop_it = match slot.value.as_mut() {
                Some(value) => !keep(id, value),
                None => false,
            };
            if drop_it {
                slot.value = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                removed += 1;
            }
        }
        self.len -= removed;
        removed
    }
}
