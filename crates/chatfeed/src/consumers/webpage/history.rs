//! Bounded, sequence-numbered message history.

use std::collections::VecDeque;

use crate::message::ChatMessage;

/// Number of recent messages replayed to new page clients.
pub const HISTORY_CAPACITY: usize = 30;

/// A message tagged with its position in the broadcast order.
///
/// Sequence numbers start at 1 and never repeat, so `0` can be used as the
/// watermark of a client that has seen nothing.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub seq: u64,
    pub message: ChatMessage,
}

#[derive(Debug)]
pub struct MessageHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    last_seq: u64,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_seq: 0,
        }
    }

    /// Append a message, displacing the oldest one when full.
    pub fn push(&mut self, message: ChatMessage) -> HistoryEntry {
        self.last_seq += 1;
        let entry = HistoryEntry {
            seq: self.last_seq,
            message,
        };

        if self.capacity == 0 {
            return entry;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Retained entries newer than `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.seq > seq)
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
