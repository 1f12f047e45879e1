//! Sample-accurate event queue.
//!
//! Messages wait here until the engine renders the frame they are stamped
//! with. Storage is reserved up front; a full queue drops the new message.

use std::collections::VecDeque;

use log::warn;

use crate::synth::message::{SynthMessage, TimedMessage};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

pub struct Scheduler {
    queue: VecDeque<TimedMessage>,
    capacity: usize,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert in timestamp order. Messages with equal timestamps keep their
    /// arrival order. Returns false (and drops the message) when full.
    pub fn enqueue(&mut self, message: TimedMessage) -> bool {
        if self.queue.len() >= self.capacity {
            warn!(
                "event queue full ({} pending), dropping {:?}",
                self.queue.len(),
                message.message
            );
            return false;
        }

        let index = self
            .queue
            .partition_point(|queued| queued.timestamp <= message.timestamp);
        self.queue.insert(index, message);
        true
    }

    /// Next message due at or before `frame`.
    #[inline]
    pub fn pop_due(&mut self, frame: u64) -> Option<SynthMessage> {
        match self.queue.front() {
            Some(next) if next.timestamp <= frame => self.queue.pop_front().map(|m| m.message),
            _ => None,
        }
    }

    /// Timestamp of the earliest queued message.
    pub fn next_timestamp(&self) -> Option<u64> {
        self.queue.front().map(|m| m.timestamp)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
