// ─── Meta Cache ───
// ETag bookkeeping for conditional downloads: remembers, per destination
// file, the validator the server handed out last time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub etag: String,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Persistent map of destination path → cache validators, stored as one
/// JSON index file.
pub struct MetaCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MetaCache {
    /// Load the index at `path`; a missing or unreadable index simply
    /// starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, dest: &Path) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap()
            .get(&key_for(dest))
            .cloned()
    }

    pub fn update(&self, dest: &Path, etag: String, last_modified: Option<String>) {
        self.entries.lock().unwrap().insert(
            key_for(dest),
            CacheEntry {
                etag,
                last_modified,
            },
        );
        self.save();
    }

    fn save(&self) {
        let entries = self.entries.lock().unwrap();
        let raw = match serde_json::to_string_pretty(&*entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize meta cache: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, raw) {
            // losing a validator only costs a re-download
            warn!("Failed to write meta cache at {:?}: {}", self.path, e);
        }
    }
}

fn key_for(dest: &Path) -> String {
    dest.to_string_lossy().into_owned()
}
