//! Configuration for objcap-core
//!
//! Centralized configuration for the working-directory layout, event
//! buffering, timing, device requirements and reconstruction inputs.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bridge::DropPolicy;
use crate::error::{ConfigError, PathError};

/// Default checkpoint directory, relative to the working root
pub const DEFAULT_CHECKPOINT_DIRECTORY: &str = "Snapshots/";

/// Default images directory, relative to the working root
pub const DEFAULT_IMAGES_DIRECTORY: &str = "Images/";

/// System-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Working-directory layout
    pub directories: DirectoryConfig,
    /// Pre-sink event buffering
    pub events: EventConfig,
    /// Timing settings
    pub timing: TimingConfig,
    /// Device capability requirements
    pub device: DeviceConfig,
    /// Reconstruction input settings
    pub reconstruction: ReconstructionConfig,
}

/// Working-directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Application-private root every relative path resolves against
    pub working_root: PathBuf,
    /// Checkpoint directory for the capture session
    pub checkpoint_directory: String,
    /// Directory the capture session writes images into
    pub images_directory: String,
    /// Delete and recreate both directories on every session setup
    pub reset_directories_on_setup: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            working_root: dirs::document_dir().unwrap_or_else(|| PathBuf::from(".")),
            checkpoint_directory: DEFAULT_CHECKPOINT_DIRECTORY.to_string(),
            images_directory: DEFAULT_IMAGES_DIRECTORY.to_string(),
            reset_directories_on_setup: true,
        }
    }
}

/// Pre-sink event buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Maximum number of events held while no sink is attached
    pub buffer_capacity: usize,
    /// Which event to discard when the buffer is full
    pub drop_policy: DropPolicy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            drop_policy: DropPolicy::DropOldest,
        }
    }
}

/// Timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after `finish` before verifying captured images
    pub finish_settle_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            finish_settle_delay_ms: 1000,
        }
    }
}

/// Device capability requirements checked during session setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware feature tiers the GPU must support, checked in order
    pub required_hardware_tiers: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            required_hardware_tiers: vec!["apple4".to_string(), "apple5".to_string()],
        }
    }
}

/// Reconstruction input settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Image extensions accepted as reconstruction input (case-insensitive)
    pub accepted_image_extensions: Vec<String>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            accepted_image_extensions: ["jpg", "jpeg", "png", "heic", "heif", "tif", "tiff"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults rooted at `working_root` instead of the documents directory
    pub fn with_working_root(working_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.directories.working_root = working_root.into();
        config
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Standard location: `<config_dir>/objcap/config.toml`
    pub fn standard_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("objcap").join("config.toml"))
    }

    /// Load from the standard location, falling back to defaults when the
    /// file is absent or invalid
    pub fn load_standard() -> Self {
        let Some(path) = Self::standard_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}, using defaults", path, e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.buffer_capacity == 0 {
            return Err(ConfigError::OutOfRange(
                "events.buffer_capacity must be positive".to_string(),
            ));
        }

        for (field, value) in [
            ("directories.checkpoint_directory", &self.directories.checkpoint_directory),
            ("directories.images_directory", &self.directories.images_directory),
        ] {
            check_relative_path(value)
                .map_err(|e| ConfigError::InvalidPath(field.to_string(), e))?;
        }

        if self.reconstruction.accepted_image_extensions.is_empty() {
            return Err(ConfigError::MissingField(
                "reconstruction.accepted_image_extensions".to_string(),
            ));
        }

        // Five minutes is far beyond any plausible settling time
        if self.timing.finish_settle_delay_ms > 300_000 {
            return Err(ConfigError::OutOfRange(
                "timing.finish_settle_delay_ms must not exceed 300000".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolve `relative` against `root`, dropping any trailing separator.
///
/// The result always names a location strictly inside `root`: empty and
/// absolute inputs, `..` segments and inputs that reduce to the root itself
/// are rejected.
pub fn resolve_path(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    if relative.trim().is_empty() {
        return Err(PathError::Empty);
    }

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::Escapes(relative.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(relative.to_string()))
            }
        }
    }

    if depth == 0 {
        return Err(PathError::Root(relative.to_string()));
    }
    Ok(resolved)
}

/// Check that `relative` would resolve inside any working root
pub fn check_relative_path(relative: &str) -> Result<(), PathError> {
    resolve_path(Path::new(""), relative).map(|_| ())
}
