//! Capture session management
//!
//! The [`SessionManager`] owns the single live [`CaptureHandle`], serializes
//! lifecycle commands from every UI surface and republishes native signals
//! as bridge events.

mod handle;
mod manager;
mod state;

pub use handle::{CaptureHandle, CapturePlatform, NativeSignal, SignalSender};
pub use manager::{DirectoryLayout, SessionManager};
pub use state::{CameraAuthorization, CaptureState, Feedback, TrackingState};
