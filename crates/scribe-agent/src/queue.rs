use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::epoch_millis;

/// A user message waiting for the current turn to finish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub content: String,
    /// Enqueue time, epoch milliseconds.
    pub timestamp: u64,
}

/// FIFO buffer arbitrating user input against the single in-flight turn.
///
/// Entries leave the queue only through `dequeue` or an explicit `remove`.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, content: impl Into<String>) -> QueuedMessage {
        let message = QueuedMessage {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: epoch_millis(),
        };
        self.entries.push_back(message.clone());
        message
    }

    /// Oldest remaining entry, or `None` when the queue is empty.
    pub fn dequeue(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Delete one entry by id, preserving the order of the rest.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        self.entries.remove(index);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }
}
