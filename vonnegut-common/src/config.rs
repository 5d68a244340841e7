//! Configuration management for Vonnegut

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// 24-bit signed offset field limit enforced on `segment_bytes` (spec §3,
/// §9: the sparse index stores `rel_offset`/`file_pos` as signed int24).
pub const MAX_SEGMENT_BYTES: u64 = (1 << 23) - 1;

/// Top-level engine configuration, process-wide at init (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Network configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-partition log engine configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.log.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the Kafka-compatible TCP listener binds to.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9092".to_string(),
        }
    }
}

/// Per-partition log engine configuration, spec §6's enumerated options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Ordered list of base directories; one is selected per partition.
    pub log_dirs: Vec<PathBuf>,

    /// Per-segment `.log` soft cap. Must be `<= 2^23 - 1` (24-bit index
    /// encoding, spec §3 "Offsets encoding width").
    pub segment_bytes: u64,

    /// Per-segment `.index` cap.
    pub index_max_bytes: u64,

    /// Bytes of log data between sparse index entries.
    pub index_interval_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dirs: vec![PathBuf::from("./data")],
            segment_bytes: 4 * 1024 * 1024,
            index_max_bytes: 10 * 1024 * 1024,
            index_interval_bytes: 4096,
        }
    }
}

impl LogConfig {
    /// Refuse to start a partition whose configuration cannot be
    /// represented by the 24-bit sparse index (spec §7 "Configuration
    /// violation").
    pub fn validate(&self) -> Result<()> {
        if self.log_dirs.is_empty() {
            return Err(ConfigError::NoLogDirs.into());
        }
        if self.segment_bytes > MAX_SEGMENT_BYTES {
            return Err(ConfigError::SegmentBytesTooLarge {
                got: self.segment_bytes,
                max: MAX_SEGMENT_BYTES,
            }
            .into());
        }
        Ok(())
    }
}
