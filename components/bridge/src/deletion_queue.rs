//! Finalizations deferred until no script frame is on the stack.

use core_types::{HostPointer, NativeClassId};

/// A finalization waiting to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDeletion {
    /// Class the object was bound as
    pub class_id: NativeClassId,
    /// The host object
    pub pointer: HostPointer,
    /// Whether the binding was persistent
    pub persistent: bool,
}

/// Fixed-size ring buffer of pending finalizations.
///
/// The capacity is rounded up to a power of two.
///
/// # Examples
///
/// ```
/// use bridge::{DeletionQueue, PendingDeletion};
/// use core_types::{HostPointer, NativeClassId};
///
/// let mut queue = DeletionQueue::new(3);
/// assert_eq!(queue.capacity(), 4);
///
/// let entry = PendingDeletion {
///     class_id: NativeClassId(0),
///     pointer: HostPointer::new(0x10).unwrap(),
///     persistent: false,
/// };
/// queue.push(entry).unwrap();
/// assert_eq!(queue.pop(), Some(entry));
/// assert!(queue.is_empty());
/// ```
#[derive(Debug)]
pub struct DeletionQueue {
    slots: Vec<Option<PendingDeletion>>,
    head: usize,
    tail: usize,
}

impl DeletionQueue {
    /// Creates a queue holding at least `size` entries.
    pub fn new(size: usize) -> Self {
        let capacity = size.max(1).next_power_of_two();
        Self {
            slots: vec![None; capacity],
            head: 0,
            tail: 0,
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Whether the queue is full.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Appends an entry. A full queue hands the entry back.
    pub fn push(&mut self, entry: PendingDeletion) -> Result<(), PendingDeletion> {
        if self.is_full() {
            return Err(entry);
        }
        let mask = self.capacity() - 1;
        self.slots[self.tail & mask] = Some(entry);
        self.tail += 1;
        Ok(())
    }

    /// Removes the oldest entry.
    pub fn pop(&mut self) -> Option<PendingDeletion> {
        if self.is_empty() {
            return None;
        }
        let mask = self.capacity() - 1;
        let entry = self.slots[self.head & mask].take();
        self.head += 1;
        if self.is_empty() {
            self.head = 0;
            self.tail = 0;
        }
        entry
    }
}
