use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ManifestError;

const TEMP_SUFFIX: &str = "tmp";

/// Progress record of a run, rewritten after every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// UUID v4 of the run that created the manifest.
    pub run_id: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// BLAKE3 digest of the settings that determine row contents and ids.
    pub fingerprint: String,
    pub dataset: String,
    pub model: String,
    pub batch_size: usize,
    /// First id not yet covered by a completed batch.
    pub next_id: u64,
    pub completed_batches: usize,
    /// Batches dropped under the `skip` generation-failure policy.
    #[serde(default)]
    pub skipped_batches: Vec<usize>,
}

impl RunManifest {
    pub fn new(
        fingerprint: impl Into<String>,
        dataset: impl Into<String>,
        model: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            fingerprint: fingerprint.into(),
            dataset: dataset.into(),
            model: model.into(),
            batch_size,
            next_id: 0,
            completed_batches: 0,
            skipped_batches: Vec::new(),
        }
    }

    /// Reads a manifest; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ManifestError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ManifestError::Json {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes via a synced temp file and rename, so readers never see a partial file.
    pub fn write_atomic(&self, path: &Path) -> Result<(), ManifestError> {
        let io_err = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(self).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let temp_path = temp_path(path);
        {
            let mut file = File::create(&temp_path).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }

        fs::rename(&temp_path, path).map_err(io_err)
    }

    /// Records a persisted batch. A batch skipped by an earlier run and completed on
    /// resume is no longer listed as skipped.
    pub fn record_batch(&mut self, batch_index: usize, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
        self.completed_batches += 1;
        self.skipped_batches.retain(|&skipped| skipped != batch_index);
    }

    /// Records a batch dropped after a generation failure.
    pub fn record_skip(&mut self, batch_index: usize) {
        if !self.skipped_batches.contains(&batch_index) {
            self.skipped_batches.push(batch_index);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}
