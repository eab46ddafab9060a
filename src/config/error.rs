//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
///
/// All of these are raised before the first batch is generated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Dataset name is not one of the supported corpora.
    #[error("unsupported dataset '{value}': expected one of sciq, coqa, triviaqa, sampleqa")]
    UnknownDataset { value: String },

    /// Scoring-method tag is not recognised.
    #[error("unsupported {kind} method '{tag}'")]
    UnsupportedMethod { kind: &'static str, tag: String },

    /// Destination lifecycle mode is not recognised.
    #[error(
        "invalid destination mode '{value}': expected append, overwrite, error-if-exists or resume"
    )]
    InvalidDestinationMode { value: String },

    /// Generation failure policy is not recognised.
    #[error("invalid generation failure policy '{value}': expected abort or skip")]
    InvalidFailurePolicy { value: String },

    /// A count setting could not be parsed as a number.
    #[error("failed to parse {name} '{value}': {source}")]
    CountParseError {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A count setting must be at least one.
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },

    /// The model identifier is blank.
    #[error("model identifier must not be empty")]
    EmptyModel,

    /// Attention similarity was requested from a backend that cannot return attentions.
    #[error("model '{model}' cannot return attention weights; choose another similarity method")]
    AttentionUnsupported { model: String },

    /// A resumable run was started against a manifest from a different configuration.
    #[error("manifest {path} was written by a different configuration; refusing to resume")]
    ManifestMismatch { path: PathBuf },

    /// Specified path does not exist on the filesystem.
    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    /// Path exists but is not a file (when a file was expected).
    #[error("path is not a file: {path}")]
    NotAFile { path: PathBuf },

    /// Path exists but is not a directory (when a directory was expected).
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}
