use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unsupported dataset: {name}")]
    Unsupported { name: String },

    #[error("dataset file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record at {path}:{line} is unusable: {reason}")]
    InvalidRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

pub type DatasetResult<T> = Result<T, DatasetError>;
