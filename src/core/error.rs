use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("All mirrors failed for {url}")]
    AllMirrorsFailed { url: String },

    #[error("Job failed: {failed} of {total} downloads did not complete ({first})")]
    JobFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("{algorithm} mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        algorithm: &'static str,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Version data ────────────────────────────────────
    #[error("Invalid library coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Version format error: {0}")]
    VersionFormat(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Tasks ───────────────────────────────────────────
    #[error("Aborted")]
    Aborted,

    #[error("Tried to modify task '{0}' while it is running")]
    TaskAlreadyRunning(String),

    // ── Process ─────────────────────────────────────────
    #[error("Failed to start process: {0}")]
    ProcessSpawn(String),

    #[error("Process exited with code {0}")]
    ProcessExit(i32),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// True when the error is the cooperative-cancellation marker rather
    /// than a real failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, LauncherError::Aborted)
    }
}
