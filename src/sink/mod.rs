//! Result persistence.
//!
//! A [`ResultSink`] receives rows in id order and makes each one durable before
//! returning. [`DestinationMode`] decides what happens to a destination left over
//! from an earlier run.

/// CSV file sink.
pub mod file;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod memory;

#[cfg(test)]
mod tests;

pub use file::CsvSink;
pub use error::{SinkError, SinkResult};
#[cfg(any(test, feature = "mock"))]
pub use memory::MemorySink;

use std::fmt;
use std::str::FromStr;

use crate::pipeline::ResultRow;

/// Append-only destination for result rows.
pub trait ResultSink {
    /// Persists one row; the row is durable once this returns `Ok`.
    fn append(&mut self, row: &ResultRow) -> SinkResult<()>;

    /// Rows persisted through this sink (earlier runs excluded).
    fn rows_written(&self) -> u64;

    /// Highest id already persisted before this sink was opened, if resuming.
    fn resume_after(&self) -> Option<u64> {
        None
    }
}

/// Lifecycle of a destination that already exists when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationMode {
    /// Append after existing content; a fresh header is written (may duplicate).
    #[default]
    Append,
    /// Truncate before the first row.
    Overwrite,
    /// Refuse to start.
    ErrorIfExists,
    /// Keep existing rows, suppress the header, skip already-persisted ids.
    Resume,
}

impl DestinationMode {
    pub const ALL: [DestinationMode; 4] = [
        DestinationMode::Append,
        DestinationMode::Overwrite,
        DestinationMode::ErrorIfExists,
        DestinationMode::Resume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationMode::Append => "append",
            DestinationMode::Overwrite => "overwrite",
            DestinationMode::ErrorIfExists => "error-if-exists",
            DestinationMode::Resume => "resume",
        }
    }
}

impl FromStr for DestinationMode {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| SinkError::InvalidMode {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for DestinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
