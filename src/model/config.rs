use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// List name; doubles as the SQL table name
    #[serde(default = "default_list_name")]
    pub name: String,
    /// Extra columns beyond the required ones, created by `tl init`
    #[serde(default)]
    pub keys: Vec<String>,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            name: default_list_name(),
            keys: Vec::new(),
        }
    }
}

fn default_list_name() -> String {
    "todo".to_string()
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Delim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Database or delimited file. Relative paths resolve against the
    /// config file's directory.
    #[serde(default = "default_backend_path")]
    pub path: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::default(),
            path: default_backend_path(),
        }
    }
}

fn default_backend_path() -> PathBuf {
    PathBuf::from("todo.db")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiConfig {
    /// Editor command for task edits (default: $VISUAL, $EDITOR, then vi)
    #[serde(default)]
    pub editor: Option<String>,
    /// Color overrides by theme slot name (e.g. highlight = "#FB4196")
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; default is tasklist.log next to the config file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
