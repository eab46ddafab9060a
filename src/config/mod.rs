//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `SIEVE_*` environment variables; the
//! binary layers command-line flags on top of whatever this loads.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_NEW_TOKENS};
use crate::dataset::DatasetName;
use crate::pipeline::GenerationFailurePolicy;
use crate::similarity::SimilarityMethod;
use crate::sink::DestinationMode;
use crate::uncertainty::UncertaintyMethod;

/// Model identifier that selects the deterministic stub backend.
pub const STUB_MODEL_ID: &str = "stub";

/// Run configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `SIEVE_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Generation backend identifier: [`STUB_MODEL_ID`] or a GGUF model path. Default: `stub`.
    pub model: String,

    /// Dataset to score. Default: `sampleqa`.
    pub dataset: DatasetName,

    /// Directory holding `{dataset}.jsonl` files. Default: `./data`.
    pub data_dir: PathBuf,

    /// Directory receiving `results_{dataset}.csv`. Default: `.`.
    pub output_dir: PathBuf,

    /// Samples per generation call. Default: `32`.
    pub batch_size: usize,

    /// Uncertainty reduction. Default: `lastde`.
    pub uncertainty_method: UncertaintyMethod,

    /// Similarity method; `None` disables similarity. Default: `none`.
    pub similarity_method: Option<SimilarityMethod>,

    /// Sentence-embedding model directory for `sbert`; stub mode when unset.
    pub embedder_path: Option<PathBuf>,

    /// Cap on generated tokens per sample. Default: `64`.
    pub max_new_tokens: usize,

    /// What to do with an existing destination file. Default: `append`.
    pub destination_mode: DestinationMode,

    /// What to do when a batch fails to generate. Default: `abort`.
    pub on_generation_failure: GenerationFailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: STUB_MODEL_ID.to_string(),
            dataset: DatasetName::SampleQa,
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("."),
            batch_size: DEFAULT_BATCH_SIZE,
            uncertainty_method: UncertaintyMethod::default(),
            similarity_method: None,
            embedder_path: None,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            destination_mode: DestinationMode::default(),
            on_generation_failure: GenerationFailurePolicy::default(),
        }
    }
}

/// Raw setting values that take precedence over the environment (command-line flags).
///
/// `None` leaves the loaded value untouched; values are parsed like their env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub dataset: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub uncertainty_method: Option<String>,
    pub similarity_method: Option<String>,
    pub embedder_path: Option<PathBuf>,
    pub max_new_tokens: Option<usize>,
    pub destination_mode: Option<String>,
    pub on_generation_failure: Option<String>,
}

impl Config {
    pub const ENV_MODEL: &'static str = "SIEVE_MODEL";
    pub const ENV_DATASET: &'static str = "SIEVE_DATASET";
    pub const ENV_DATA_DIR: &'static str = "SIEVE_DATA_DIR";
    pub const ENV_OUTPUT_DIR: &'static str = "SIEVE_OUTPUT_DIR";
    pub const ENV_BATCH_SIZE: &'static str = "SIEVE_BATCH_SIZE";
    pub const ENV_UNCERTAINTY_METHOD: &'static str = "SIEVE_UNCERTAINTY_METHOD";
    pub const ENV_SIMILARITY_METHOD: &'static str = "SIEVE_SIMILARITY_METHOD";
    pub const ENV_EMBEDDER_PATH: &'static str = "SIEVE_EMBEDDER_PATH";
    pub const ENV_MAX_NEW_TOKENS: &'static str = "SIEVE_MAX_NEW_TOKENS";
    pub const ENV_DESTINATION_MODE: &'static str = "SIEVE_DESTINATION_MODE";
    pub const ENV_ON_GENERATION_FAILURE: &'static str = "SIEVE_ON_GENERATION_FAILURE";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let model = Self::parse_string_from_env(Self::ENV_MODEL, defaults.model);
        let dataset = match Self::non_empty_env(Self::ENV_DATASET) {
            Some(value) => Self::parse_dataset(&value)?,
            None => defaults.dataset,
        };
        let data_dir = Self::parse_path_from_env(Self::ENV_DATA_DIR, defaults.data_dir);
        let output_dir = Self::parse_path_from_env(Self::ENV_OUTPUT_DIR, defaults.output_dir);
        let batch_size = Self::parse_count_from_env(Self::ENV_BATCH_SIZE, defaults.batch_size)?;
        let uncertainty_method = match Self::non_empty_env(Self::ENV_UNCERTAINTY_METHOD) {
            Some(value) => Self::parse_uncertainty_method(&value)?,
            None => defaults.uncertainty_method,
        };
        let similarity_method = match env::var(Self::ENV_SIMILARITY_METHOD) {
            Ok(value) => Self::parse_similarity_method(&value)?,
            Err(_) => defaults.similarity_method,
        };
        let embedder_path = Self::parse_optional_path_from_env(Self::ENV_EMBEDDER_PATH);
        let max_new_tokens =
            Self::parse_count_from_env(Self::ENV_MAX_NEW_TOKENS, defaults.max_new_tokens)?;
        let destination_mode = match Self::non_empty_env(Self::ENV_DESTINATION_MODE) {
            Some(value) => Self::parse_destination_mode(&value)?,
            None => defaults.destination_mode,
        };
        let on_generation_failure = match Self::non_empty_env(Self::ENV_ON_GENERATION_FAILURE) {
            Some(value) => Self::parse_failure_policy(&value)?,
            None => defaults.on_generation_failure,
        };

        Ok(Self {
            model,
            dataset,
            data_dir,
            output_dir,
            batch_size,
            uncertainty_method,
            similarity_method,
            embedder_path,
            max_new_tokens,
            destination_mode,
            on_generation_failure,
        })
    }

    /// Applies `overrides` on top of this configuration.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(ref model) = overrides.model {
            self.model = model.trim().to_string();
        }
        if let Some(ref dataset) = overrides.dataset {
            self.dataset = Self::parse_dataset(dataset)?;
        }
        if let Some(ref dir) = overrides.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(ref dir) = overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(ref method) = overrides.uncertainty_method {
            self.uncertainty_method = Self::parse_uncertainty_method(method)?;
        }
        if let Some(ref method) = overrides.similarity_method {
            self.similarity_method = Self::parse_similarity_method(method)?;
        }
        if let Some(ref path) = overrides.embedder_path {
            self.embedder_path = Some(path.clone());
        }
        if let Some(max_new_tokens) = overrides.max_new_tokens {
            self.max_new_tokens = max_new_tokens;
        }
        if let Some(ref mode) = overrides.destination_mode {
            self.destination_mode = Self::parse_destination_mode(mode)?;
        }
        if let Some(ref policy) = overrides.on_generation_failure {
            self.on_generation_failure = Self::parse_failure_policy(policy)?;
        }
        Ok(self)
    }

    /// Validates paths and basic invariants (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroCount {
                name: Self::ENV_BATCH_SIZE,
            });
        }

        if self.max_new_tokens == 0 {
            return Err(ConfigError::ZeroCount {
                name: Self::ENV_MAX_NEW_TOKENS,
            });
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }

        if self.model != STUB_MODEL_ID {
            let path = PathBuf::from(&self.model);
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path });
            }
            if !path.is_file() {
                return Err(ConfigError::NotAFile { path });
            }
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.output_dir.clone(),
            });
        }

        if let Some(ref path) = self.embedder_path {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
            if !path.is_dir() {
                return Err(ConfigError::NotADirectory { path: path.clone() });
            }
        }

        Ok(())
    }

    /// Returns `true` when rows carry a similarity score.
    pub fn similarity_enabled(&self) -> bool {
        self.similarity_method.is_some()
    }

    /// Destination file for this run, named from the dataset.
    pub fn destination_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("results_{}.csv", self.dataset.as_str()))
    }

    /// Manifest file written beside the destination.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("results_{}.manifest.json", self.dataset.as_str()))
    }

    /// BLAKE3 fingerprint of every setting that changes row content or ids.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.dataset.as_str(),
            self.model.as_str(),
            self.uncertainty_method.as_str(),
            self.similarity_method
                .map(|m| m.as_str())
                .unwrap_or(crate::similarity::SIMILARITY_DISABLED_TAG),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&(self.batch_size as u64).to_le_bytes());
        hasher.update(&(self.max_new_tokens as u64).to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub(crate) fn parse_dataset(value: &str) -> Result<DatasetName, ConfigError> {
        value.parse().map_err(|_| ConfigError::UnknownDataset {
            value: value.to_string(),
        })
    }

    pub(crate) fn parse_uncertainty_method(value: &str) -> Result<UncertaintyMethod, ConfigError> {
        value.parse().map_err(|_| ConfigError::UnsupportedMethod {
            kind: "uncertainty",
            tag: value.to_string(),
        })
    }

    pub(crate) fn parse_similarity_method(
        value: &str,
    ) -> Result<Option<SimilarityMethod>, ConfigError> {
        SimilarityMethod::parse_optional(value).map_err(|_| ConfigError::UnsupportedMethod {
            kind: "similarity",
            tag: value.to_string(),
        })
    }

    pub(crate) fn parse_destination_mode(value: &str) -> Result<DestinationMode, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidDestinationMode {
            value: value.to_string(),
        })
    }

    pub(crate) fn parse_failure_policy(
        value: &str,
    ) -> Result<GenerationFailurePolicy, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidFailurePolicy {
            value: value.to_string(),
        })
    }

    fn non_empty_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_count_from_env(var_name: &'static str, default: usize) -> Result<usize, ConfigError> {
        match Self::non_empty_env(var_name) {
            Some(value) => {
                let count: usize = value.parse().map_err(|e| ConfigError::CountParseError {
                    name: var_name,
                    value: value.clone(),
                    source: e,
                })?;

                if count == 0 {
                    return Err(ConfigError::ZeroCount { name: var_name });
                }

                Ok(count)
            }
            None => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        Self::non_empty_env(var_name).map(PathBuf::from)
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        Self::non_empty_env(var_name).unwrap_or(default)
    }
}
