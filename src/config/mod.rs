//! Configuration management.
//!
//! Resolves where jisaku keeps its data and loads the optional settings
//! file found there.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//!   config.json                          optional settings
//!   kanji-dictionary/database/db.sqlite3 persisted database image
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Default debounce between the last write statement and the save.
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 100;

/// Get the global jisaku directory location (`~/.jisaku`).
#[must_use]
pub fn global_jisaku_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".jisaku"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `JISAKU_TEST_DB=1` (or any non-empty
/// value other than `0`/`false`). It redirects all data to an isolated
/// directory.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("JISAKU_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the isolated test data directory (`~/.jisaku/test`).
#[must_use]
pub fn test_data_dir() -> Option<PathBuf> {
    global_jisaku_dir().map(|dir| dir.join("test"))
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `explicit` (the `--data-dir` flag, which clap also fills from
///    `JISAKU_DATA_DIR`)
/// 2. `JISAKU_TEST_DB` → isolated test directory
/// 3. Global location: `~/.jisaku`
#[must_use]
pub fn resolve_data_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_data_dir();
    }

    global_jisaku_dir()
}

/// Like [`resolve_data_dir`], but a missing location is an error.
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined.
pub fn require_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_data_dir(explicit).ok_or_else(|| {
        Error::Config("Could not determine home directory; pass --data-dir".to_string())
    })
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Milliseconds between the last write statement and the save.
    pub persist_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Path of the settings file in a data directory.
#[must_use]
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load settings, falling back to defaults when the file is absent.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_settings(data_dir: &Path) -> Result<Settings> {
    let path = config_path(data_dir);

    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
}

/// Write settings, creating the data directory if needed.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<()> {
    fs::create_dir_all(data_dir)
        .map_err(|e| Error::Config(format!("Failed to create data directory: {e}")))?;

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::Config(format!("Failed to serialize settings: {e}")))?;

    fs::write(config_path(data_dir), content)
        .map_err(|e| Error::Config(format!("Failed to write settings: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_data_dir_with_explicit() {
        let explicit = PathBuf::from("/custom/jisaku");
        assert_eq!(resolve_data_dir(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_test_data_dir_is_separate() {
        let global = global_jisaku_dir().unwrap();
        let test = test_data_dir().unwrap();
        assert!(test.starts_with(&global));
        assert_ne!(test, global);
    }

    #[test]
    fn test_truthy_parsing() {
        for value in ["1", "true", "yes"] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", "0", "false", "FALSE"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn test_settings_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let settings = load_settings(temp.path()).unwrap();
        assert_eq!(settings.persist_debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_settings_round_trip_and_partial_file() {
        let temp = TempDir::new().unwrap();
        save_settings(temp.path(), &Settings { persist_debounce_ms: 250 }).unwrap();
        assert_eq!(load_settings(temp.path()).unwrap().persist_debounce_ms, 250);

        fs::write(config_path(temp.path()), "{}").unwrap();
        assert_eq!(load_settings(temp.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_parse_error_is_config_error() {
        let temp = TempDir::new().unwrap();
        fs::write(config_path(temp.path()), "{ not json").unwrap();
        let err = load_settings(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
