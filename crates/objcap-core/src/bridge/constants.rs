//! Constants exported to bridge hosts

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::event::names;
use crate::session::{CaptureState, Feedback, TrackingState};

/// Events a capture module host may subscribe to
pub const CAPTURE_EVENTS: [&str; 6] = [
    names::ON_SESSION_STATE_CHANGE,
    names::ON_TRACKING_STATE_CHANGE,
    names::ON_FEEDBACK_STATE_CHANGE,
    names::ON_CAPTURE_COMPLETE,
    names::ON_SCAN_PASS_COMPLETED,
    names::ON_ERROR,
];

/// Events a reconstruction module host may subscribe to
pub const RECONSTRUCTION_EVENTS: [&str; 11] = [
    names::ON_PROGRESS,
    names::ON_COMPLETE,
    names::ON_ERROR,
    names::ON_CANCELLED,
    names::ON_REQUEST_COMPLETE,
    names::ON_INPUT_COMPLETE,
    names::ON_INVALID_SAMPLE,
    names::ON_SKIPPED_SAMPLE,
    names::ON_AUTOMATIC_DOWNSAMPLING,
    names::ON_PROCESSING_CANCELLED,
    names::ON_UNKNOWN_OUTPUT,
];

/// Value tables hosts use instead of hard-coding wire strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeConstants {
    pub session_state: BTreeMap<String, String>,
    pub tracking_state: BTreeMap<String, String>,
    pub feedback_state: BTreeMap<String, String>,
    pub capture_events: Vec<String>,
    pub reconstruction_events: Vec<String>,
}

fn table<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|v| (v.to_string(), v.to_string()))
        .collect()
}

/// Build the exported constant tables
pub fn constants() -> BridgeConstants {
    BridgeConstants {
        session_state: table(CaptureState::ALL.iter().map(CaptureState::as_str)),
        tracking_state: table(TrackingState::ALL.iter().map(TrackingState::as_str)),
        feedback_state: table(Feedback::ALL.iter().map(Feedback::as_str)),
        capture_events: CAPTURE_EVENTS.iter().map(|s| s.to_string()).collect(),
        reconstruction_events: RECONSTRUCTION_EVENTS.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_table() {
        let c = constants();
        assert_eq!(c.session_state.len(), 7);
        assert_eq!(c.session_state["finishing"], "finishing");
        assert!(!c.session_state.contains_key("unknown"));
        assert_eq!(c.feedback_state.len(), 9);
    }

    #[test]
    fn test_serialized_keys() {
        let value = serde_json::to_value(constants()).unwrap();
        assert_eq!(value["SessionState"]["ready"], "ready");
        assert_eq!(value["TrackingState"]["normal"], "normal");
        assert_eq!(value["ReconstructionEvents"][0], "onProgress");
    }
}
