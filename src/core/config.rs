// ─── Launcher Configuration ───
// Persistent settings consumed by the orchestration core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};

/// Settings file name inside the data directory.
const CONFIG_FILE: &str = "ignition.json";

/// Core settings persisted as JSON in the launcher data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    /// Root directory for libraries, caches and logs.
    pub data_dir: PathBuf,
    /// Maximum number of lines kept in the live log buffer.
    pub console_max_lines: usize,
    /// Stop appending (instead of evicting) once the log buffer fills up.
    pub stop_on_console_overflow: bool,
    /// Maximum number of simultaneous downloads in a net job.
    pub download_concurrency: usize,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            console_max_lines: 1000,
            stop_on_console_overflow: false,
            download_concurrency: 6,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ignition")
}

impl LauncherConfig {
    /// Load the config from `dir`, falling back to defaults when the file
    /// is missing or unreadable. A broken settings file must never stop a
    /// launch.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring malformed config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| LauncherError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(CONFIG_FILE);
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw).map_err(|e| LauncherError::Io { path, source: e })?;
        Ok(())
    }

    /// Where the ETag cache index lives.
    pub fn meta_cache_path(&self) -> PathBuf {
        self.data_dir.join("meta_cache.json")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = LauncherConfig::default();
        assert_eq!(config.console_max_lines, 1000);
        assert!(!config.stop_on_console_overflow);
        assert!(config.download_concurrency > 0);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::default();
        config.console_max_lines = 250;
        config.save(dir.path()).unwrap();

        let loaded = LauncherConfig::load(dir.path());
        assert_eq!(loaded.console_max_lines, 250);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let loaded = LauncherConfig::load(dir.path());
        assert_eq!(loaded.console_max_lines, 1000);
    }
}
