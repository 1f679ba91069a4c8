//! Cross-thread message inbox.
//!
//! The inbox is the only part of an environment another thread may touch.
//! Producers append under a mutex; the owning thread swaps the buffer out
//! once per update and dispatches outside the lock.

use core_types::ObjectId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// How a message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Delivered to the target's `onmessage`
    Message,
    /// Delivered to the target's `onerror`
    Error,
}

/// A message for a bound script object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Receiving object
    pub target: ObjectId,
    /// Handler to invoke
    pub kind: MessageKind,
    /// JSON-serialized payload
    pub payload: serde_json::Value,
}

impl Message {
    /// A data message.
    pub fn data(target: ObjectId, payload: serde_json::Value) -> Self {
        Self {
            target,
            kind: MessageKind::Message,
            payload,
        }
    }

    /// An error message.
    pub fn error(target: ObjectId, payload: serde_json::Value) -> Self {
        Self {
            target,
            kind: MessageKind::Error,
            payload,
        }
    }
}

/// Mutex-guarded swap buffer of messages.
///
/// # Examples
///
/// ```
/// use bridge::{Inbox, Message};
/// use core_types::{ObjectId, SlotId};
/// use std::sync::Arc;
///
/// let inbox = Arc::new(Inbox::default());
/// let target = ObjectId(SlotId::from_parts(0, 0));
///
/// let producer = Arc::clone(&inbox);
/// std::thread::spawn(move || producer.post(Message::data(target, "ping".into())))
///     .join()
///     .unwrap();
///
/// assert_eq!(inbox.take().len(), 1);
/// assert!(inbox.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Inbox {
    pending: Mutex<Vec<Message>>,
}

impl Inbox {
    /// Queues a message. Callable from any thread.
    pub fn post(&self, message: Message) {
        self.pending.lock().push(message);
    }

    /// Takes every queued message, oldest first.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no message is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
