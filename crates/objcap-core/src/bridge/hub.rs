//! Event hub: global sink, pre-sink buffer and view subscribers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::buffer::EventBuffer;
use super::event::{BridgeEvent, EventSink, SessionEvent};
use super::registry::{SessionSubscriber, SubscriberId, SubscriberRegistry};
use super::DropPolicy;
use crate::config::EventConfig;

struct Pending {
    event: BridgeEvent,
    // Flushed events already reached the views when first emitted
    to_views: bool,
}

struct HubState {
    sink: Option<Arc<dyn EventSink>>,
    buffer: EventBuffer,
    subscribers: SubscriberRegistry,
    queue: VecDeque<Pending>,
    delivering: bool,
}

impl HubState {
    /// Claim delivery of the queue; false if another caller holds it
    fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.delivering, true)
    }

    fn hold(&mut self, event: BridgeEvent) {
        let name = event.name();
        if let Some(discarded) = self.buffer.push(event) {
            tracing::warn!(
                "Event buffer full ({}), discarded {} while buffering {} ({} dropped so far)",
                self.buffer.capacity(),
                discarded.name(),
                name,
                self.buffer.dropped_count()
            );
        }
    }
}

/// Releases the delivery claim if a sink or subscriber panics
struct ReleaseOnPanic<'a>(&'a EventHub);

impl Drop for ReleaseOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}

/// Routes every event to the registered views and to the global sink.
///
/// Events are queued and delivered outside the hub lock by one caller at a
/// time, so every destination sees them in emit order, including across a
/// sink attach. Sinks and subscribers may call back into the hub; an event
/// they emit is delivered after the one being handled.
pub struct EventHub {
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            state: Mutex::new(HubState {
                sink: None,
                buffer: EventBuffer::new(capacity, policy),
                subscribers: SubscriberRegistry::new(),
                queue: VecDeque::new(),
                delivering: false,
            }),
        }
    }

    pub fn from_config(config: &EventConfig) -> Self {
        Self::new(config.buffer_capacity, config.drop_policy)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the global sink and flush buffered events to it.
    ///
    /// Returns the number of events flushed. Replaces any previous sink.
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) -> usize {
        let mut state = self.lock();
        let pending = state.buffer.drain();
        let flushed = pending.len();
        // Buffered events predate everything still queued
        for event in pending.into_iter().rev() {
            state.queue.push_front(Pending {
                event,
                to_views: false,
            });
        }
        state.sink = Some(sink);
        if flushed > 0 {
            tracing::debug!("Flushing {} buffered events to new sink", flushed);
        }

        if state.claim() {
            drop(state);
            self.drain();
        }
        flushed
    }

    /// Detach the global sink; later events are buffered again
    pub fn detach_sink(&self) -> Option<Arc<dyn EventSink>> {
        self.lock().sink.take()
    }

    pub fn has_sink(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Deliver to the sink, or buffer when none is attached.
    ///
    /// Session events are also broadcast to every registered view.
    pub fn emit(&self, event: BridgeEvent) {
        let mut state = self.lock();
        state.queue.push_back(Pending {
            event,
            to_views: true,
        });
        if state.claim() {
            drop(state);
            self.drain();
        }
    }

    fn drain(&self) {
        let _release = ReleaseOnPanic(self);
        loop {
            let mut state = self.lock();
            let Some(Pending { event, to_views }) = state.queue.pop_front() else {
                state.delivering = false;
                return;
            };

            let views = match &event {
                BridgeEvent::Session(_) if to_views => state.subscribers.live(),
                _ => Vec::new(),
            };
            // Buffer under the lock so a concurrent attach cannot miss it
            let sink = state.sink.clone();
            if sink.is_none() {
                state.hold(event.clone());
            }
            drop(state);

            if let BridgeEvent::Session(session_event) = &event {
                for view in &views {
                    view.on_session_event(session_event);
                }
            }
            if let Some(sink) = sink {
                sink.send_event(&event);
            }
        }
    }

    pub fn emit_session(&self, event: SessionEvent) {
        self.emit(BridgeEvent::Session(event));
    }

    pub fn subscribe(&self, subscriber: &Arc<dyn SessionSubscriber>) -> SubscriberId {
        self.lock().subscribers.register(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.lock().subscribers.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.lock().buffer.dropped_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::from_config(&EventConfig::default())
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventHub")
            .field("has_sink", &state.sink.is_some())
            .field("buffered", &state.buffer.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
