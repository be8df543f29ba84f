//! Error types for objcap-core

use thiserror::Error;

/// Result type alias for objcap operations
pub type Result<T> = std::result::Result<T, ObjcapError>;

/// Main error type for objcap operations
#[derive(Error, Debug)]
pub enum ObjcapError {
    /// Capture session setup failed
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    /// Bridge surface could not resolve a view
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Reconstruction job errors
    #[error("Reconstruction error: {0}")]
    Reconstruction(#[from] ReconstructionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures of `SessionManager::setup_session`.
///
/// The display strings are user-facing: they are sent verbatim as the
/// `onError` payload and returned as the setup error message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("Object Capture is not supported on this device")]
    DeviceUnsupported,

    #[error("Failed to create graphics device")]
    GraphicsDeviceUnavailable,

    #[error("Failed to create graphics command queue")]
    CommandQueueUnavailable,

    #[error("Device does not support required GPU family: {0}")]
    HardwareTierUnsupported(String),

    #[error("Camera permission not granted")]
    CameraPermissionDenied,

    #[error("Failed to create {0} directory")]
    DirectoryCreate(&'static str),

    #[error("Failed to clear {0} directory")]
    DirectoryClear(&'static str),

    #[error("Invalid {0} directory: {1}")]
    InvalidDirectory(&'static str, PathError),

    #[error("Failed to start capture session: {0}")]
    HandleCreation(String),
}

/// Failures of the imperative view surface.
///
/// Hosts assert on these exact strings, keep them stable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The view was never mounted or its native module is unavailable
    #[error("View or native module not found")]
    ModuleNotFound,

    /// The view is mounted but its node no longer resolves
    #[error("View node not found")]
    NodeNotFound,

    /// A directory argument would leave the working root
    #[error("Path must stay inside the working root")]
    InvalidPath,
}

/// A caller-supplied path that does not name a location inside the
/// working root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path must be relative to the working root: {0}")]
    Absolute(String),

    #[error("Path escapes the working root: {0}")]
    Escapes(String),

    #[error("Path names the working root itself: {0}")]
    Root(String),
}

/// Failures of the reconstruction supervisor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    /// Input directory missing or without usable images
    #[error("Invalid input: {0}")]
    Input(String),

    /// Checkpoint or output location could not be prepared
    #[error("Failed to prepare {what}: {message}")]
    Preparation { what: &'static str, message: String },

    /// The engine refused to create or start the job
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Filesystem error while listing a directory
    #[error("IO error: {0}")]
    Io(String),
}

impl ReconstructionError {
    /// Stable error category sent to hosts alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ReconstructionError::Input(_) => "invalidInput",
            ReconstructionError::Preparation { .. } => "preparationFailed",
            ReconstructionError::Engine(e) => e.code().as_str(),
            ReconstructionError::Io(_) => "io",
        }
    }
}

impl From<PathError> for ReconstructionError {
    fn from(err: PathError) -> Self {
        ReconstructionError::Input(err.to_string())
    }
}

impl From<std::io::Error> for ReconstructionError {
    fn from(err: std::io::Error) -> Self {
        ReconstructionError::Io(err.to_string())
    }
}

/// Native reconstruction error kinds the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum EngineErrorKind {
    InsufficientStorage,
    InvalidImages,
    InvalidOutput,
    /// Anything the bridge has no dedicated code for
    Other,
}

/// Error reported by a reconstruction engine, either when creating a job or
/// per request while processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Normalized code for this error
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self.kind)
    }
}

/// Fixed code enumeration for reconstruction `onError` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InsufficientStorage,
    InvalidImages,
    InvalidOutput,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientStorage => "insufficientStorage",
            ErrorCode::InvalidImages => "invalidImages",
            ErrorCode::InvalidOutput => "invalidOutput",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl From<EngineErrorKind> for ErrorCode {
    fn from(kind: EngineErrorKind) -> Self {
        match kind {
            EngineErrorKind::InsufficientStorage => ErrorCode::InsufficientStorage,
            EngineErrorKind::InvalidImages => ErrorCode::InvalidImages,
            EngineErrorKind::InvalidOutput => ErrorCode::InvalidOutput,
            EngineErrorKind::Other => ErrorCode::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Required field is missing or empty
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A directory does not stay inside the working root
    #[error("Invalid path for {0}: {1}")]
    InvalidPath(String, PathError),

    /// Configuration text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}
