//! Storage configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use quire_store::{ConflictCodes, FailureCode};
use quire_utils::LogFormat;

use crate::EngineError;

/// Which physical engine backs the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// LMDB files under `data_dir`.
    #[default]
    Lmdb,
    /// Volatile in-memory tables, for tests and tooling.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmdb" => Ok(BackendKind::Lmdb),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Lmdb => write!(f, "lmdb"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// Configuration for a Quire store.
///
/// Can be loaded from a TOML file via [`StorageConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Directory holding the LMDB files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Upper bound on the LMDB memory map, in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    /// How many times `batch` re-runs work that hit a write conflict.
    #[serde(default = "default_max_write_conflict_retries")]
    pub max_write_conflict_retries: u32,

    /// Replaces the backend's own write-conflict codes when set.
    #[serde(default)]
    pub write_conflict_codes: Option<Vec<FailureCode>>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_max_dbs() -> u32 {
    16
}

fn default_max_write_conflict_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StorageConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// A volatile configuration, for tests.
    pub fn in_memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// The configured override, if any.
    pub fn conflict_codes(&self) -> Option<ConflictCodes> {
        self.write_conflict_codes
            .as_ref()
            .map(|codes| codes.iter().copied().collect())
    }

    /// Install the process-wide tracing subscriber described by this config.
    pub fn init_logging(&self) -> Result<(), EngineError> {
        quire_utils::try_init_logging(self.log_format, &self.log_level)
            .map_err(|e| EngineError::Logging(e.to_string()))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            max_dbs: default_max_dbs(),
            max_write_conflict_retries: default_max_write_conflict_retries(),
            write_conflict_codes: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
