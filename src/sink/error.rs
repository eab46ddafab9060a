use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    #[error("invalid destination mode: {value}")]
    InvalidMode { value: String },

    #[error("failed to write row {id} to {path}: {source}")]
    WriteFailed {
        id: u64,
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },

    #[error("failed to read existing destination {path}: {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;
