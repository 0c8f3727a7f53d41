//! Error handling for silkpatch
//!
//! Application code propagates `anyhow` errors; failures the caller may want
//! to match on are `SilkpatchError` variants.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context naming the URL being transferred
    fn with_url_context(self, url: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_url_context(self, url: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error downloading {}", url))
    }
}

/// Specific error types for silkpatch operations
#[derive(Debug, thiserror::Error)]
pub enum SilkpatchError {
    #[error("Root directory does not exist: {path}")]
    RootNotFound { path: String },

    #[error("Rule {rule} must run after {requires}")]
    RuleOrder {
        rule: &'static str,
        requires: &'static str,
    },

    #[error("{failed} of {total} downloads failed: {}", .files.join(", "))]
    DownloadsIncomplete {
        failed: usize,
        total: usize,
        files: Vec<String>,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Archive not found: {path}")]
    ArchiveMissing { path: String },

    #[error("Extraction with {program} failed: {reason}")]
    ExtractionFailed { program: String, reason: String },

    #[error("Invalid archive: {reason}")]
    InvalidArchive { reason: String },
}
