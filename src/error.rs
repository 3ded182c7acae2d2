//! Error taxonomy for the dedupe engine.
//!
//! Only `Input`, `Config`, `Executor` and `Cancelled` ever reach the caller of
//! a run. The per-item variants are produced inside the pipeline, logged, and
//! turned into skip records or counters.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = DedupError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DedupError
{
    /// Input directory missing or inaccessible
    #[error("input directory {} is not accessible: {reason}", .path.display())]
    Input
    {
        path: PathBuf,
        reason: String,
    },

    /// Document could not be read or decoded as text
    #[error("cannot read {}: {reason}", .path.display())]
    FileRead
    {
        path: PathBuf,
        reason: String,
    },

    /// Unexpected failure deriving features from readable content
    #[error("feature extraction failed for {}: {reason}", .path.display())]
    Extraction
    {
        path: PathBuf,
        reason: String,
    },

    /// Unexpected failure scoring one pair
    #[error("scoring {} against {} failed: {reason}", .file1.display(), .file2.display())]
    Scoring
    {
        file1: PathBuf,
        file2: PathBuf,
        reason: String,
    },

    /// Copying a document into its destination bucket failed
    #[error("failed to write {}: {source}", .path.display())]
    OutputWrite
    {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unloadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Worker pool could not be constructed
    #[error("executor error: {0}")]
    Executor(String),

    /// The run was cancelled between or during phases
    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {context}: {source}")]
    Io
    {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl DedupError
{
    /// Wrap an IO error with a short description of what was attempted
    pub fn io(
        context: impl Into<String>,
        source: std::io::Error,
    ) -> Self
    {
        Self::Io { context: context.into(), source }
    }

    /// True for errors that abort a run rather than skip one item
    pub fn is_fatal(&self) -> bool
    {
        matches!(
            self,
            Self::Input { .. } | Self::Config(_) | Self::Executor(_) | Self::Cancelled | Self::Io { .. }
        )
    }
}
