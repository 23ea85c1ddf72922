use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persisted TUI state (written to state.json)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UiState {
    /// Per-list state, keyed by list name
    #[serde(default)]
    pub lists: HashMap<String, ListUiState>,
}

/// Where the TUI was on one list
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ListUiState {
    /// Cursor line
    #[serde(default)]
    pub cursor: usize,
    /// Scroll offset
    #[serde(default)]
    pub offset: usize,
    /// Last search pattern
    #[serde(default)]
    pub last_search: Option<String>,
}

/// Read state.json from the state directory
pub fn read_ui_state(state_dir: &Path) -> Option<UiState> {
    let content = fs::read_to_string(state_dir.join("state.json")).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write state.json to the state directory
pub fn write_ui_state(state_dir: &Path, state: &UiState) -> Result<(), std::io::Error> {
    let content = serde_json::to_string_pretty(state)?;
    fs::write(state_dir.join("state.json"), content)
}
