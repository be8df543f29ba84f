//! Session commands and status shared by the HTTP and socket surfaces

use std::str::FromStr;

use serde::Serialize;

use objcap_core::session::{CaptureState, Feedback, SessionManager, TrackingState};

/// Fire-and-forget session commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Resume,
    Pause,
    StartDetection,
    ResetDetection,
    StartCapturing,
    BeginNewScan,
    BeginNewScanAfterFlip,
    Finish,
    Cancel,
}

impl SessionCommand {
    pub const ALL: [SessionCommand; 9] = [
        SessionCommand::Resume,
        SessionCommand::Pause,
        SessionCommand::StartDetection,
        SessionCommand::ResetDetection,
        SessionCommand::StartCapturing,
        SessionCommand::BeginNewScan,
        SessionCommand::BeginNewScanAfterFlip,
        SessionCommand::Finish,
        SessionCommand::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionCommand::Resume => "resume",
            SessionCommand::Pause => "pause",
            SessionCommand::StartDetection => "startDetection",
            SessionCommand::ResetDetection => "resetDetection",
            SessionCommand::StartCapturing => "startCapturing",
            SessionCommand::BeginNewScan => "beginNewScan",
            SessionCommand::BeginNewScanAfterFlip => "beginNewScanAfterFlip",
            SessionCommand::Finish => "finish",
            SessionCommand::Cancel => "cancel",
        }
    }

    pub async fn run(self, session: &SessionManager) {
        match self {
            SessionCommand::Resume => session.resume_session().await,
            SessionCommand::Pause => session.pause_session().await,
            SessionCommand::StartDetection => session.start_detection().await,
            SessionCommand::ResetDetection => session.reset_detection().await,
            SessionCommand::StartCapturing => session.start_capturing().await,
            SessionCommand::BeginNewScan => session.begin_new_scan().await,
            SessionCommand::BeginNewScanAfterFlip => session.begin_new_scan_after_flip().await,
            SessionCommand::Finish => session.finish_session().await,
            SessionCommand::Cancel => session.cancel_session().await,
        }
    }
}

impl FromStr for SessionCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionCommand::ALL
            .iter()
            .find(|command| command.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown session command: {s}"))
    }
}

/// Everything the session query surface reports, in one response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: CaptureState,
    pub tracking: TrackingState,
    pub feedback: Vec<Feedback>,
    pub shots_taken: u32,
    pub user_completed_scan_pass: bool,
    pub scan_pass_updates: u64,
    pub device_supported: bool,
}

impl SessionStatus {
    pub async fn collect(session: &SessionManager) -> Self {
        Self {
            state: session.get_session_state().await,
            tracking: session.get_tracking_state().await,
            feedback: session.get_feedback_state().await,
            shots_taken: session.get_number_of_shots_taken().await,
            user_completed_scan_pass: session.get_user_completed_scan_state().await,
            scan_pass_updates: session.get_number_of_scan_pass_updates().await,
            device_supported: session.is_device_supported().await,
        }
    }
}

/// Bridge form of the setup result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SetupOutcome {
    pub async fn run(session: &SessionManager) -> Self {
        match session.setup_session().await {
            Ok(()) => Self {
                success: true,
                error_message: None,
            },
            Err(e) => Self {
                success: false,
                error_message: Some(e.to_string()),
            },
        }
    }
}
