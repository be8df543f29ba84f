//! Seams to the native capture framework
//!
//! The platform's object-capture session is opaque to this crate. Hosts
//! implement [`CapturePlatform`] and [`CaptureHandle`] over it and report
//! state changes through a [`SignalSender`].

use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use super::state::{CameraAuthorization, CaptureState, Feedback, TrackingState};

/// Device capabilities and the handle factory
pub trait CapturePlatform: Send + Sync {
    /// Whether object capture is supported on this device at all
    fn is_supported(&self) -> bool;

    /// Name of the default graphics acceleration device, if one exists
    fn graphics_device(&self) -> Option<String>;

    /// Whether a command queue can be created on the graphics device
    fn has_command_queue(&self) -> bool;

    /// Whether the graphics device supports the named hardware feature tier
    fn supports_hardware_tier(&self, tier: &str) -> bool;

    /// Current camera authorization
    fn camera_authorization(&self) -> CameraAuthorization;

    /// Prompt the user for camera access; resolves with the user's answer
    fn request_camera_access(&self) -> oneshot::Receiver<bool>;

    /// Create a new, not yet started, capture handle.
    ///
    /// The handle reports every state change through `signals` for as long
    /// as it lives.
    fn create_handle(&self, signals: SignalSender) -> Result<Box<dyn CaptureHandle>, String>;
}

/// A live native capture session
pub trait CaptureHandle: Send + Sync {
    fn start(&self, images_directory: &Path, checkpoint_directory: &Path);
    fn resume(&self);
    fn pause(&self);
    fn start_detecting(&self);
    fn reset_detection(&self);
    fn start_capturing(&self);
    fn begin_new_scan_pass(&self);
    fn begin_new_scan_pass_after_flip(&self);
    fn finish(&self);
    fn cancel(&self);

    fn state(&self) -> CaptureState;
    fn tracking(&self) -> TrackingState;
    fn feedback(&self) -> Vec<Feedback>;
    fn number_of_shots_taken(&self) -> u32;
    fn user_completed_scan_pass(&self) -> bool;
}

/// A state change reported by the native session
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSignal {
    StateChanged(CaptureState),
    TrackingChanged(TrackingState),
    FeedbackChanged(Vec<Feedback>),
    /// The "user completed a scan pass" flag flipped
    ScanPassChanged(bool),
}

/// Sending half of the native signal channel.
///
/// Sends never block; signals sent after the session manager tore the
/// handle down are discarded.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<NativeSignal>,
}

impl SignalSender {
    /// Create a connected sender/receiver pair
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NativeSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, signal: NativeSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("Dropping native signal, session already torn down");
        }
    }

    pub fn state_changed(&self, state: CaptureState) {
        self.send(NativeSignal::StateChanged(state));
    }

    pub fn tracking_changed(&self, tracking: TrackingState) {
        self.send(NativeSignal::TrackingChanged(tracking));
    }

    pub fn feedback_changed(&self, feedback: Vec<Feedback>) {
        self.send(NativeSignal::FeedbackChanged(feedback));
    }

    pub fn scan_pass_changed(&self, completed: bool) {
        self.send(NativeSignal::ScanPassChanged(completed));
    }

    /// Whether the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
