//! Configuration structures.
//!
//! Configuration is loaded from a JSON file and overridden on the command line.
//! Every section has defaults, so an empty object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Process event source configuration.
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IPC server bind address (TCP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50061".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections. Connections beyond this limit
    /// are rejected.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Connections idle beyond this
    /// duration are dropped. Time spent waiting for a process event does
    /// not count against it.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            max_connections: 16,
            read_timeout_secs: 300,
            write_timeout_secs: 10,
        }
    }
}

/// Which notification facility feeds the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Poll the proc filesystem for new pids.
    Procfs,
    /// In-memory source; events only arrive when emitted programmatically.
    Manual,
}

impl std::str::FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "procfs" => Ok(SourceKind::Procfs),
            "manual" => Ok(SourceKind::Manual),
            _ => Err(Error::validation(format!("Invalid source kind: {}", s))),
        }
    }
}

/// Event source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// How often the procfs source rescans.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Root of the proc filesystem.
    pub proc_root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Procfs,
            poll_interval: Duration::from_millis(250),
            proc_root: PathBuf::from("/proc"),
        }
    }
}
