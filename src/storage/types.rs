use std::path::PathBuf;
use std::time::SystemTime;

use thiserror::Error;

use crate::feed::RenderError;

// ============================================================================
// Error Types
// ============================================================================

/// Failures on the write side of the store.
///
/// Read paths never return these: a missing or unreadable file is reported as
/// `None` and logged instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create feed directory '{}': {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render feed: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to write feed file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan feed directory '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete feed file '{}': {source}", .path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Data Structures
// ============================================================================

/// Metadata for one keyword file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name including the `.xml` extension.
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    pub modified: SystemTime,
}
