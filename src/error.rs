//! Error types for strata.
//!
//! Only configuration and I/O can fail. Detection, filtering, manifest
//! construction and assembly are total functions over their inputs: a
//! document with no recognizable structure yields an empty result, not an
//! error.

use std::path::PathBuf;

/// Errors that can occur while loading profiles or persisting results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The profile file does not exist.
    #[error("profile not found: {}", .0.display())]
    ProfileNotFound(PathBuf),

    /// Filesystem error while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The profile document is not valid YAML or does not match the schema.
    #[error("profile parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A chunk or manifest record is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A profile pattern failed to compile.
    #[error("invalid regex in {field}: {source}")]
    InvalidPattern {
        /// Which profile field held the pattern.
        field: String,
        /// The underlying compile error.
        source: regex::Error,
    },

    /// The profile parsed but failed validation.
    ///
    /// Every problem found is reported at once.
    #[error("invalid profile: {}", .0.join("; "))]
    InvalidProfile(Vec<String>),
}

/// Result type for strata operations.
pub type Result<T> = std::result::Result<T, Error>;
