//! Registered view subscribers
//!
//! Views subscribe to session events for as long as they are mounted. The
//! registry only holds weak references: a view that is dropped without
//! unregistering is pruned on the next delivery.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use super::event::SessionEvent;

/// Receives session events on behalf of a mounted view
pub trait SessionSubscriber: Send + Sync {
    fn on_session_event(&self, event: &SessionEvent);
}

/// Registration token returned by `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: BTreeMap<SubscriberId, Weak<dyn SessionSubscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscriber: &Arc<dyn SessionSubscriber>) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.subscribers.insert(id, Arc::downgrade(subscriber));
        id
    }

    /// Returns false if `id` was not registered
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Every live subscriber in registration order, pruning dropped ones
    pub fn live(&mut self) -> Vec<Arc<dyn SessionSubscriber>> {
        let mut live = Vec::with_capacity(self.subscribers.len());
        self.subscribers.retain(|id, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => {
                tracing::debug!("Pruning dropped view subscriber {}", id.0);
                false
            }
        });
        live
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}
