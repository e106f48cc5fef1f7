use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};
use thiserror::Error;

use crate::importer::RawImportOptions;

const CONFIG_NAMESPACE: &str = "changelog-import";
const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ImporterConfig {
    /// JSON file used as the changelog store by the command line tool
    pub store_path: Option<PathBuf>,
    #[serde(default, alias = "options")]
    pub import: RawImportOptions,
}

impl ImporterConfig {
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: ImporterConfig,
    /// `None` when no file was found and defaults are in use
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory via XDG environment variables")]
    MissingConfigDir,
    #[error("failed to read config file at {path:?}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config file at {path:?}: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },
}

/// Load the configuration from `explicit` or from the default location.
///
/// An explicit path must exist. A missing default file, or an environment
/// without a config directory, yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match resolve_config_path() {
            Ok(path) if path.exists() => path,
            Ok(_) | Err(ConfigError::MissingConfigDir) => {
                log::debug!("No config file found, using defaults");
                return Ok(ConfigLoadResult {
                    config: ImporterConfig::default(),
                    path: None,
                });
            }
            Err(err) => return Err(err),
        },
    };

    let config_text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        source,
        path: path.clone(),
    })?;
    let config = parse_config(&config_text).map_err(|source| ConfigError::Parse {
        source,
        path: path.clone(),
    })?;
    log::debug!("Loaded config from {}", path.display());

    Ok(ConfigLoadResult {
        config,
        path: Some(path),
    })
}

pub fn parse_config(text: &str) -> Result<ImporterConfig, toml::de::Error> {
    toml::from_str(text)
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_home_dir()?
        .join(CONFIG_NAMESPACE)
        .join(CONFIG_FILENAME))
}

fn config_home_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    #[cfg(windows)]
    if let Some(dir) = env::var_os("APPDATA") {
        return Ok(PathBuf::from(dir));
    }

    if let Some(home) = env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".config"));
    }

    Err(ConfigError::MissingConfigDir)
}
