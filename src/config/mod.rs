//! Client configuration: `pagesync.toml` plus environment and CLI overrides

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

use crate::network::{ConnectionConfig, MAX_BLOCK_LEN};
use crate::sync::records::{DEFAULT_PAGE_SIZE, DEFAULT_RESTORE_BATCH};
use crate::sync::{SyncConfig, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub sync: SyncSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `quic://host:port` or `file://path`
    pub target: Option<String>,
    /// Secret key file the bearer token is derived from
    pub identity: Option<PathBuf>,
    pub insecure: bool,
    pub server_name: String,
    /// DER certificate to trust in addition to the system roots
    pub trusted_cert: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_retry_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            target: None,
            identity: None,
            insecure: false,
            server_name: "localhost".to_string(),
            trusted_cert: None,
            request_timeout_secs: 30,
            max_retry_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub block_size: u64,
    /// Write throughput cap in bytes/second
    pub bandwidth_limit: Option<u64>,
    pub rotate_reference: bool,
    pub record_page_size: u32,
    pub restore_batch: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            bandwidth_limit: None,
            rotate_reference: false,
            record_page_size: DEFAULT_PAGE_SIZE,
            restore_batch: DEFAULT_RESTORE_BATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where the remote store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// `host:port` of a QUIC store server
    Quic(String),
    /// Store file hosted in-process
    File(PathBuf),
}

impl FromStr for RemoteTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "remote.target".into(),
            message: format!("{message}: '{s}'"),
        };

        if let Some(rest) = s.strip_prefix("quic://") {
            let authority = rest.trim_end_matches('/');
            match authority.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(RemoteTarget::Quic(authority.to_string()))
                }
                _ => Err(invalid("expected quic://host:port")),
            }
        } else if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(invalid("expected file://path"));
            }
            Ok(RemoteTarget::File(PathBuf::from(path)))
        } else {
            Err(invalid("unsupported scheme"))
        }
    }
}

impl Config {
    pub fn validate(&self) -> ConfigResult<()> {
        self.check_block_size(self.sync.block_size)?;
        if self.sync.bandwidth_limit == Some(0) {
            return Err(ConfigError::Validation {
                message: "sync.bandwidth_limit must be greater than zero".into(),
            });
        }
        if self.sync.record_page_size == 0 || self.sync.restore_batch == 0 {
            return Err(ConfigError::Validation {
                message: "record page and batch sizes must be greater than zero".into(),
            });
        }
        if let Some(target) = &self.remote.target {
            target.parse::<RemoteTarget>()?;
        }
        Ok(())
    }

    /// Reject block sizes the configured target cannot carry
    pub fn check_block_size(&self, block_size: u64) -> ConfigResult<()> {
        if block_size == 0 {
            return Err(ConfigError::Validation {
                message: "sync.block_size must be greater than zero".into(),
            });
        }

        let quic = matches!(
            self.remote.target.as_deref().map(str::parse::<RemoteTarget>),
            Some(Ok(RemoteTarget::Quic(_)))
        );
        if quic && block_size > MAX_BLOCK_LEN {
            return Err(ConfigError::Validation {
                message: format!(
                    "block size {block_size} exceeds the {MAX_BLOCK_LEN} byte limit of quic targets"
                ),
            });
        }
        Ok(())
    }

    pub fn remote_target(&self) -> ConfigResult<RemoteTarget> {
        self.remote
            .target
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "remote.target".into(),
            })?
            .parse()
    }

    pub fn identity_path(&self) -> ConfigResult<&PathBuf> {
        self.remote
            .identity
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "remote.identity".into(),
            })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_block_size(self.sync.block_size)
            .with_bandwidth_limit(self.sync.bandwidth_limit)
            .rotate_reference(self.sync.rotate_reference)
    }

    /// Client transport settings; reads the trusted certificate if one is configured
    pub fn connection_config(&self) -> ConfigResult<ConnectionConfig> {
        let trusted_cert_der = match &self.remote.trusted_cert {
            Some(path) => Some(std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?),
            None => None,
        };

        Ok(ConnectionConfig {
            server_name: self.remote.server_name.clone(),
            insecure_skip_verify: self.remote.insecure,
            trusted_cert_der,
            request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
            max_retry_elapsed: Duration::from_secs(self.remote.max_retry_secs),
            ..Default::default()
        })
    }
}
