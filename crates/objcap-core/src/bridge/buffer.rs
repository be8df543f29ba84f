//! Bounded pre-sink event buffer

use std::collections::VecDeque;

use super::event::BridgeEvent;
use super::DropPolicy;

/// FIFO of events produced while no global sink is attached.
///
/// Holds at most `capacity` events. When full, [`DropPolicy`] decides which
/// event is discarded; discards are counted for the lifetime of the buffer.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<BridgeEvent>,
    capacity: usize,
    policy: DropPolicy,
    dropped: u64,
}

impl EventBuffer {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            policy,
            dropped: 0,
        }
    }

    /// Append an event, returning the one discarded to make room, if any.
    pub fn push(&mut self, event: BridgeEvent) -> Option<BridgeEvent> {
        if self.events.len() < self.capacity {
            self.events.push_back(event);
            return None;
        }

        self.dropped += 1;
        match self.policy {
            DropPolicy::DropOldest => {
                let discarded = self.events.pop_front();
                self.events.push_back(event);
                discarded
            }
            DropPolicy::DropNewest => Some(event),
        }
    }

    /// Take every buffered event in arrival order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Total number of events discarded so far
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}
