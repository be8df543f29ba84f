//! Directory listings for output browsing

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconstructionError;

/// A file or directory inside a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    /// Unix seconds; falls back to the modification time where the
    /// filesystem does not record creation
    pub creation_date: i64,
    pub is_directory: bool,
}

/// Snapshot of a directory's immediate children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub path: String,
    pub exists: bool,
    pub files: Vec<FileEntry>,
}

fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// List `dir`, sorted by name. A missing directory is not an error.
pub fn list_directory(dir: &Path) -> Result<DirectoryListing, ReconstructionError> {
    let path = dir.to_string_lossy().into_owned();
    if !dir.is_dir() {
        return Ok(DirectoryListing {
            path,
            exists: false,
            files: Vec::new(),
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(unix_seconds)
            .unwrap_or(0);

        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_string_lossy().into_owned(),
            size: metadata.len(),
            creation_date: created,
            is_directory: metadata.is_dir(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(DirectoryListing {
        path,
        exists: true,
        files,
    })
}
