use crate::pipeline::ResultRow;

use super::error::{SinkError, SinkResult};
use super::ResultSink;

/// In-memory sink that records rows; can be told to fail after N appends.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<ResultRow>,
    fail_after: Option<usize>,
    resume_after: Option<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `rows` appends, then fails every later one.
    pub fn failing_after(rows: usize) -> Self {
        Self {
            fail_after: Some(rows),
            ..Self::default()
        }
    }

    /// Pretends ids `..=last_id` were persisted by an earlier run.
    pub fn resuming_after(last_id: u64) -> Self {
        Self {
            resume_after: Some(last_id),
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn ids(&self) -> Vec<u64> {
        self.rows.iter().map(|row| row.id).collect()
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, row: &ResultRow) -> SinkResult<()> {
        if self.fail_after.is_some_and(|limit| self.rows.len() >= limit) {
            return Err(SinkError::WriteFailed {
                id: row.id,
                path: "memory".into(),
                source: std::io::Error::other("injected failure").into(),
            });
        }

        self.rows.push(row.clone());
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows.len() as u64
    }

    fn resume_after(&self) -> Option<u64> {
        self.resume_after
    }
}
