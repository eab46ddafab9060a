use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::constants::RESULT_HEADER;
use crate::pipeline::ResultRow;

use super::error::{SinkError, SinkResult};
use super::{DestinationMode, ResultSink};

/// CSV destination opened, written, flushed and closed once per row.
///
/// The header is written at most once per sink. A crash after row N leaves rows
/// `..=N` on disk.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    header_written: bool,
    truncate_pending: bool,
    rows_written: u64,
    resume_after: Option<u64>,
}

impl CsvSink {
    /// Binds the sink to `path` under `mode`, creating parent directories.
    ///
    /// `overwrite` leaves the existing file untouched until the first row is appended.
    /// `resume` cuts an incomplete trailing record left by an interrupted write.
    pub fn open(path: impl Into<PathBuf>, mode: DestinationMode) -> SinkResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let exists = path.exists();
        let mut sink = Self {
            path,
            header_written: false,
            truncate_pending: false,
            rows_written: 0,
            resume_after: None,
        };

        match mode {
            DestinationMode::Append => {
                if exists {
                    warn!(
                        path = %sink.path.display(),
                        "Destination exists, appending (header will repeat)"
                    );
                }
            }
            DestinationMode::Overwrite => {
                sink.truncate_pending = exists;
            }
            DestinationMode::ErrorIfExists => {
                if exists {
                    return Err(SinkError::DestinationExists { path: sink.path });
                }
            }
            DestinationMode::Resume => {
                if exists {
                    let scan = recover_destination(&sink.path)?;
                    sink.header_written = scan.complete_len > 0;
                    sink.resume_after = scan.last_id;
                    info!(
                        path = %sink.path.display(),
                        last_id = ?sink.resume_after,
                        "Resuming destination"
                    );
                }
            }
        }

        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(&self, row: &ResultRow) -> Result<(), ::csv::Error> {
        let mut options = OpenOptions::new();
        options.create(true);
        if self.truncate_pending {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&self.path)?;

        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if !self.header_written {
            writer.write_record(RESULT_HEADER)?;
        }
        writer.write_record(row.to_record())?;

        let file = writer
            .into_inner()
            .map_err(|e| ::csv::Error::from(e.into_error()))?;
        file.sync_data()?;
        Ok(())
    }
}

impl ResultSink for CsvSink {
    fn append(&mut self, row: &ResultRow) -> SinkResult<()> {
        self.write_row(row)
            .map_err(|source| SinkError::WriteFailed {
                id: row.id,
                path: self.path.clone(),
                source,
            })?;

        if self.truncate_pending {
            debug!(path = %self.path.display(), "Destination overwritten");
            self.truncate_pending = false;
        }
        self.header_written = true;
        self.rows_written += 1;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn resume_after(&self) -> Option<u64> {
        self.resume_after
    }
}

/// Complete-record prefix of an existing destination.
#[derive(Debug, Default, PartialEq)]
struct Scan {
    /// Highest id among complete data records.
    last_id: Option<u64>,
    /// Byte length of the prefix ending with the last complete record.
    complete_len: u64,
}

/// Scans `path` and cuts anything after its last complete record.
///
/// A record is complete when it has one field per header column and ends in a
/// newline. Header lines (including repeated ones) count as complete but carry no id.
fn recover_destination(path: &Path) -> SinkResult<Scan> {
    let bytes = fs::read(path)?;
    let scan = scan_records(&bytes).map_err(|source| SinkError::ScanFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let len = bytes.len() as u64;
    if scan.complete_len < len {
        warn!(
            path = %path.display(),
            kept_bytes = scan.complete_len,
            dropped_bytes = len - scan.complete_len,
            "Discarding incomplete trailing record"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(scan.complete_len)?;
        file.sync_all()?;
    }

    Ok(scan)
}

fn scan_records(bytes: &[u8]) -> Result<Scan, ::csv::Error> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_reader(bytes);

    let mut scan = Scan::default();
    let mut record = ::csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let end = reader.position().byte();
        let terminated = end > 0 && bytes.get(end as usize - 1) == Some(&b'\n');
        if record.len() != RESULT_HEADER.len() || !terminated {
            continue;
        }

        let id = record
            .get(0)
            .and_then(|field| std::str::from_utf8(field).ok())
            .and_then(|field| field.parse::<u64>().ok());
        if let Some(id) = id {
            scan.last_id = Some(scan.last_id.map_or(id, |prev| prev.max(id)));
        }
        scan.complete_len = end;
    }

    Ok(scan)
}
