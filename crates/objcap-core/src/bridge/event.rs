//! Typed bridge events and their wire form
//!
//! Every event has a stable name (`onSessionStateChange`, `onProgress`, ...)
//! and a JSON body. Hosts receive the typed value through [`EventSink`] and
//! can serialize it with [`BridgeEvent::to_json`].

use serde_json::{json, Value};

use crate::error::ErrorCode;
use crate::session::{CaptureState, Feedback, TrackingState};

/// Event names emitted by the capture session
pub mod names {
    pub const ON_SESSION_STATE_CHANGE: &str = "onSessionStateChange";
    pub const ON_TRACKING_STATE_CHANGE: &str = "onTrackingStateChange";
    pub const ON_FEEDBACK_STATE_CHANGE: &str = "onFeedbackStateChange";
    pub const ON_CAPTURE_COMPLETE: &str = "onCaptureComplete";
    pub const ON_SCAN_PASS_COMPLETED: &str = "onScanPassCompleted";
    pub const ON_ERROR: &str = "onError";

    pub const ON_PROGRESS: &str = "onProgress";
    pub const ON_COMPLETE: &str = "onComplete";
    pub const ON_CANCELLED: &str = "onCancelled";
    pub const ON_REQUEST_COMPLETE: &str = "onRequestComplete";
    pub const ON_INPUT_COMPLETE: &str = "onInputComplete";
    pub const ON_INVALID_SAMPLE: &str = "onInvalidSample";
    pub const ON_SKIPPED_SAMPLE: &str = "onSkippedSample";
    pub const ON_AUTOMATIC_DOWNSAMPLING: &str = "onAutomaticDownsampling";
    pub const ON_PROCESSING_CANCELLED: &str = "onProcessingCancelled";
    pub const ON_UNKNOWN_OUTPUT: &str = "onUnknownOutput";

    pub const ON_APPEAR: &str = "onAppear";
    pub const ON_CLOUD_POINT_VIEW_APPEAR: &str = "onCloudPointViewAppear";
}

/// Events republished from the native capture session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionStateChange { state: CaptureState },
    TrackingStateChange { tracking: TrackingState },
    FeedbackStateChange { feedback: Vec<Feedback> },
    CaptureComplete { completed: bool },
    ScanPassCompleted { completed: bool },
    Error { error: String },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStateChange { .. } => names::ON_SESSION_STATE_CHANGE,
            SessionEvent::TrackingStateChange { .. } => names::ON_TRACKING_STATE_CHANGE,
            SessionEvent::FeedbackStateChange { .. } => names::ON_FEEDBACK_STATE_CHANGE,
            SessionEvent::CaptureComplete { .. } => names::ON_CAPTURE_COMPLETE,
            SessionEvent::ScanPassCompleted { .. } => names::ON_SCAN_PASS_COMPLETED,
            SessionEvent::Error { .. } => names::ON_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            SessionEvent::SessionStateChange { state } => json!({ "state": state.as_str() }),
            SessionEvent::TrackingStateChange { tracking } => {
                json!({ "tracking": tracking.as_str() })
            }
            SessionEvent::FeedbackStateChange { feedback } => {
                let feedback: Vec<&str> = feedback.iter().map(Feedback::as_str).collect();
                json!({ "feedback": feedback })
            }
            SessionEvent::CaptureComplete { completed } => json!({ "completed": completed }),
            SessionEvent::ScanPassCompleted { completed } => json!({ "completed": completed }),
            SessionEvent::Error { error } => json!({ "error": error }),
        }
    }
}

/// Events relayed from a reconstruction job
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionEvent {
    Progress { progress: f64 },
    Complete,
    Error {
        error: String,
        code: ErrorCode,
        request: String,
    },
    Cancelled,
    RequestComplete,
    InputComplete,
    InvalidSample { id: String, reason: String },
    SkippedSample { id: String },
    AutomaticDownsampling,
    ProcessingCancelled,
    UnknownOutput,
}

impl ReconstructionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReconstructionEvent::Progress { .. } => names::ON_PROGRESS,
            ReconstructionEvent::Complete => names::ON_COMPLETE,
            ReconstructionEvent::Error { .. } => names::ON_ERROR,
            ReconstructionEvent::Cancelled => names::ON_CANCELLED,
            ReconstructionEvent::RequestComplete => names::ON_REQUEST_COMPLETE,
            ReconstructionEvent::InputComplete => names::ON_INPUT_COMPLETE,
            ReconstructionEvent::InvalidSample { .. } => names::ON_INVALID_SAMPLE,
            ReconstructionEvent::SkippedSample { .. } => names::ON_SKIPPED_SAMPLE,
            ReconstructionEvent::AutomaticDownsampling => names::ON_AUTOMATIC_DOWNSAMPLING,
            ReconstructionEvent::ProcessingCancelled => names::ON_PROCESSING_CANCELLED,
            ReconstructionEvent::UnknownOutput => names::ON_UNKNOWN_OUTPUT,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ReconstructionEvent::Progress { progress } => json!({ "progress": progress }),
            ReconstructionEvent::Error {
                error,
                code,
                request,
            } => json!({ "error": error, "code": code.as_str(), "request": request }),
            ReconstructionEvent::InvalidSample { id, reason } => {
                json!({ "id": id, "reason": reason })
            }
            ReconstructionEvent::SkippedSample { id } => json!({ "id": id }),
            _ => json!({}),
        }
    }
}

/// Any event crossing the bridge to a global emitter
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Session(SessionEvent),
    Reconstruction(ReconstructionEvent),
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Session(e) => e.name(),
            BridgeEvent::Reconstruction(e) => e.name(),
        }
    }

    pub fn body(&self) -> Value {
        match self {
            BridgeEvent::Session(e) => e.body(),
            BridgeEvent::Reconstruction(e) => e.body(),
        }
    }

    /// `{"event": <name>, "body": <body>}`
    pub fn to_json(&self) -> Value {
        json!({ "event": self.name(), "body": self.body() })
    }
}

impl From<SessionEvent> for BridgeEvent {
    fn from(event: SessionEvent) -> Self {
        BridgeEvent::Session(event)
    }
}

impl From<ReconstructionEvent> for BridgeEvent {
    fn from(event: ReconstructionEvent) -> Self {
        BridgeEvent::Reconstruction(event)
    }
}

/// Global event emitter the bridge delivers to.
///
/// Called while the delivering hub holds its lock, so implementations must
/// not call back into the hub that feeds them.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: &BridgeEvent);
}
