use crate::config::{Config, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "pagesync.toml";
pub const ENV_REMOTE: &str = "PAGESYNC_REMOTE";
pub const ENV_IDENTITY: &str = "PAGESYNC_IDENTITY";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path` if given (it must exist), else `pagesync.toml` in the
    /// current directory if present, else defaults; then apply environment
    /// overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };

        Self::apply_env(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> ConfigResult<Config> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&contents, path)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str, path: &Path) -> ConfigResult<Config> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
        if let Some(target) = var(ENV_REMOTE).filter(|v| !v.is_empty()) {
            config.remote.target = Some(target);
        }
        if let Some(identity) = var(ENV_IDENTITY).filter(|v| !v.is_empty()) {
            config.remote.identity = Some(PathBuf::from(identity));
        }
    }

    pub fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Validation {
            message: format!("Failed to serialize to TOML: {e}"),
        })?;

        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
