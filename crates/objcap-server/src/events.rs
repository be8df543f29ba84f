//! Global event emitter fanned out to connected clients

use serde_json::Value;
use tokio::sync::broadcast;

use objcap_core::bridge::{BridgeEvent, EventSink};

/// Sends every bridge event, as `{"event", "body"}` JSON, to all
/// subscribed clients. Events sent while nobody is subscribed are dropped.
pub struct BroadcastSink {
    sender: broadcast::Sender<Value>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn send_event(&self, event: &BridgeEvent) {
        if self.sender.send(event.to_json()).is_err() {
            tracing::debug!("No clients connected, dropped {}", event.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcap_core::bridge::{ReconstructionEvent, SessionEvent};

    #[test]
    fn test_every_subscriber_receives_event() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.send_event(&BridgeEvent::Reconstruction(ReconstructionEvent::Complete));

        let expected = serde_json::json!({"event": "onComplete", "body": {}});
        assert_eq!(a.try_recv().unwrap(), expected);
        assert_eq!(b.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let sink = BroadcastSink::new(8);
        sink.send_event(&BridgeEvent::Session(SessionEvent::Error {
            error: "nobody listening".into(),
        }));
        assert_eq!(sink.receiver_count(), 0);
    }
}
