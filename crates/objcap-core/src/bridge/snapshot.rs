//! Latest-value view of the capture session
//!
//! Hosts that render session state (rather than react to each event) fold
//! the event stream into a [`SessionSnapshot`].

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::event::{BridgeEvent, EventSink, SessionEvent};
use crate::session::{CaptureState, Feedback, TrackingState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: CaptureState,
    pub tracking: TrackingState,
    pub feedback: Vec<Feedback>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: CaptureState::Initializing,
            tracking: TrackingState::NotAvailable,
            feedback: vec![Feedback::ObjectNotDetected],
        }
    }
}

impl SessionSnapshot {
    /// Fold one event in; returns true if the snapshot changed
    pub fn apply(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::SessionStateChange { state } if *state != self.state => {
                self.state = *state;
                true
            }
            SessionEvent::TrackingStateChange { tracking } if *tracking != self.tracking => {
                self.tracking = *tracking;
                true
            }
            SessionEvent::FeedbackStateChange { feedback } if *feedback != self.feedback => {
                self.feedback = feedback.clone();
                true
            }
            _ => false,
        }
    }
}

/// An [`EventSink`] that keeps a [`SessionSnapshot`] current
#[derive(Debug, Default)]
pub struct SnapshotSink {
    snapshot: Mutex<SessionSnapshot>,
}

impl SnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for SnapshotSink {
    fn send_event(&self, event: &BridgeEvent) {
        if let BridgeEvent::Session(event) = event {
            self.snapshot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, CaptureState::Initializing);
        assert_eq!(snapshot.tracking, TrackingState::NotAvailable);
        assert_eq!(snapshot.feedback, vec![Feedback::ObjectNotDetected]);
    }

    #[test]
    fn test_sink_folds_session_events() {
        let sink = SnapshotSink::new();
        sink.send_event(&SessionEvent::SessionStateChange { state: CaptureState::Capturing }.into());
        sink.send_event(&SessionEvent::TrackingStateChange { tracking: TrackingState::Limited }.into());
        sink.send_event(&SessionEvent::FeedbackStateChange { feedback: vec![] }.into());
        sink.send_event(&SessionEvent::Error { error: "ignored".into() }.into());

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.state, CaptureState::Capturing);
        assert_eq!(snapshot.tracking, TrackingState::Limited);
        assert!(snapshot.feedback.is_empty());
    }

    #[test]
    fn test_apply_reports_change() {
        let mut snapshot = SessionSnapshot::default();
        let event = SessionEvent::SessionStateChange { state: CaptureState::Ready };
        assert!(snapshot.apply(&event));
        assert!(!snapshot.apply(&event));
    }
}
