use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::Config;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "TASKLIST_CONFIG";

/// Error type for config discovery and loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot locate a config directory: set TASKLIST_CONFIG or HOME")]
    NoConfigDir,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("could not serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A config together with where it came from. Relative paths inside it
/// have already been resolved against the config file's directory.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// The config file (may not exist yet)
    pub path: PathBuf,
    /// Directory holding the config, the UI state, the log and the
    /// recovery log
    pub state_dir: PathBuf,
}

impl LoadedConfig {
    pub fn log_path(&self) -> PathBuf {
        self.config
            .log
            .file
            .clone()
            .unwrap_or_else(|| self.state_dir.join("tasklist.log"))
    }
}

/// Find the config file: an explicit path, then `$TASKLIST_CONFIG`, then
/// `$XDG_CONFIG_HOME/tasklist/config.toml`, then `~/.config/tasklist/config.toml`.
pub fn discover_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    discover_with(explicit, |key| std::env::var(key).ok())
}

fn discover_with<F>(explicit: Option<&Path>, env: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let non_empty = |key: &str| env(key).filter(|v| !v.is_empty());
    if let Some(path) = non_empty(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let base = match non_empty("XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(non_empty("HOME").ok_or(ConfigError::NoConfigDir)?).join(".config"),
    };
    Ok(base.join("tasklist").join("config.toml"))
}

/// Read a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let mut config = if path.exists() {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?
    } else {
        Config::default()
    };

    let state_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    config.backend.path = resolve(&state_dir, &config.backend.path);
    config.log.file = config.log.file.map(|f| resolve(&state_dir, &f));

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        state_dir,
    })
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Write `config` to `path`, creating parent directories. Returns false
/// without touching anything when the file exists and `force` is unset.
pub fn write_config(path: &Path, config: &Config, force: bool) -> Result<bool, ConfigError> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(true)
}
