//! Capture session state machine
//!
//! State transitions, as observed through native signals:
//! ```text
//! Initializing → Ready → Detecting → Capturing → Completed
//!                  ↓         ↓           ↓   ↘
//!                Failed    Failed     Failed  Finishing → Completed
//! ```
//!
//! `Unknown` is never produced by a live handle; it is the sentinel reported
//! when no handle exists.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The capture state of the native session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum CaptureState {
    #[default]
    Initializing,
    Ready,
    Detecting,
    Capturing,
    Finishing,
    Completed,
    Failed,
    Unknown,
}

impl CaptureState {
    /// Every state a live handle can report, in lifecycle order
    pub const ALL: [CaptureState; 7] = [
        CaptureState::Initializing,
        CaptureState::Ready,
        CaptureState::Detecting,
        CaptureState::Capturing,
        CaptureState::Finishing,
        CaptureState::Completed,
        CaptureState::Failed,
    ];

    /// Check if a state transition is valid
    pub fn can_transition_to(&self, target: &CaptureState) -> bool {
        use CaptureState::*;
        match (self, target) {
            (Initializing, Ready) => true,
            (Ready, Detecting) => true,
            (Detecting, Capturing) => true,
            // resetDetection returns to ready
            (Detecting, Ready) => true,
            (Capturing, Finishing) => true,
            (Capturing, Completed) => true,
            (Finishing, Completed) => true,

            // Any live state can fail
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => !matches!(self, Unknown),
            _ => false,
        }
    }

    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Completed | CaptureState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Initializing => "initializing",
            CaptureState::Ready => "ready",
            CaptureState::Detecting => "detecting",
            CaptureState::Capturing => "capturing",
            CaptureState::Finishing => "finishing",
            CaptureState::Completed => "completed",
            CaptureState::Failed => "failed",
            CaptureState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaptureState::ALL
            .iter()
            .chain(std::iter::once(&CaptureState::Unknown))
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown capture state: {s}"))
    }
}

/// Camera tracking quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum TrackingState {
    #[default]
    NotAvailable,
    Limited,
    Normal,
    Unknown,
}

impl TrackingState {
    pub const ALL: [TrackingState; 3] = [
        TrackingState::NotAvailable,
        TrackingState::Limited,
        TrackingState::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::NotAvailable => "notAvailable",
            TrackingState::Limited => "limited",
            TrackingState::Normal => "normal",
            TrackingState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackingState::ALL
            .iter()
            .chain(std::iter::once(&TrackingState::Unknown))
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown tracking state: {s}"))
    }
}

/// Guidance the native session gives the user while capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum Feedback {
    ObjectTooClose,
    ObjectTooFar,
    MovingTooFast,
    EnvironmentLowLight,
    EnvironmentTooDark,
    OutOfFieldOfView,
    ObjectNotFlippable,
    OverCapturing,
    ObjectNotDetected,
    Unknown,
}

impl Feedback {
    pub const ALL: [Feedback; 9] = [
        Feedback::ObjectTooClose,
        Feedback::ObjectTooFar,
        Feedback::MovingTooFast,
        Feedback::EnvironmentLowLight,
        Feedback::EnvironmentTooDark,
        Feedback::OutOfFieldOfView,
        Feedback::ObjectNotFlippable,
        Feedback::OverCapturing,
        Feedback::ObjectNotDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::ObjectTooClose => "objectTooClose",
            Feedback::ObjectTooFar => "objectTooFar",
            Feedback::MovingTooFast => "movingTooFast",
            Feedback::EnvironmentLowLight => "environmentLowLight",
            Feedback::EnvironmentTooDark => "environmentTooDark",
            Feedback::OutOfFieldOfView => "outOfFieldOfView",
            Feedback::ObjectNotFlippable => "objectNotFlippable",
            Feedback::OverCapturing => "overCapturing",
            Feedback::ObjectNotDetected => "objectNotDetected",
            Feedback::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feedback::ALL
            .iter()
            .chain(std::iter::once(&Feedback::Unknown))
            .find(|feedback| feedback.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown feedback: {s}"))
    }
}

/// Camera authorization as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
#[serde(rename_all = "camelCase")]
pub enum CameraAuthorization {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}
