//! Objcap Core - Object capture session bridging and reconstruction supervision
//!
//! This crate sits between a platform's object-capture and photogrammetry
//! frameworks and a cross-platform application layer:
//!
//! - **Session**: Single owner of the live capture handle; serializes lifecycle commands and republishes native signals
//! - **Bridge**: Typed events, the global sink with its bounded pre-sink buffer, view subscriptions and exported constants
//! - **View**: Capture and point-cloud view adapters with node resolution and their failure modes
//! - **Reconstruction**: Input validation, single live job supervision and output relaying
//! - **Config**: Directory layout, event buffering, timing and device requirements
//! - **Simulated**: Software platform and engine for development and tests
//!
//! # Data flow
//!
//! ```text
//! UI command → View ref → SessionManager → CaptureHandle
//!                                              │ native signals
//!                                              ▼
//!         view listeners ← EventHub → global EventSink (buffered until attached)
//! ```
//!
//! The vision and reconstruction algorithms themselves live in the platform
//! frameworks, reached through the [`CapturePlatform`], [`CaptureHandle`] and
//! [`ReconstructionEngine`] traits.

pub mod bridge;
pub mod config;
pub mod error;
pub mod reconstruction;
pub mod session;
pub mod simulated;
pub mod view;

#[cfg(feature = "uniffi")]
pub mod ffi;

pub use bridge::{
    BridgeEvent, DropPolicy, EventHub, EventSink, ReconstructionEvent, SessionEvent,
    SessionSnapshot, SnapshotSink,
};
pub use config::{CaptureConfig, DirectoryConfig, EventConfig, TimingConfig};
pub use error::{
    BridgeError, ConfigError, EngineError, EngineErrorKind, ErrorCode, ObjcapError,
    ReconstructionError, Result, SetupError,
};
pub use reconstruction::{
    DirectoryListing, FileEntry, JobOutput, ReconstructionEngine, ReconstructionJob,
    ReconstructionSupervisor,
};
pub use session::{
    CameraAuthorization, CaptureHandle, CapturePlatform, CaptureState, Feedback, NativeSignal,
    SessionManager, SignalSender, TrackingState,
};
pub use view::{CaptureView, NodeHandle, PointCloudView, ViewModule};

// Setup UniFFI when the feature is enabled
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();

/// Returns the version of objcap-core
#[cfg(feature = "uniffi")]
#[uniffi::export]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
