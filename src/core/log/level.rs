// ─── Log Levels ───
// Severity classification for captured game/launcher output, including the
// explicit `!![Level]!` line marker and the content-based level guesser.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Undetermined, will be classified downstream.
    Unknown,
    /// From the process stdout, level not yet determined.
    StdOut,
    /// From the process stderr, level not yet determined.
    StdErr,
    /// Issued by the launcher itself.
    Launcher,
    Debug,
    Info,
    Message,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Parse a level by name, as used in the `!![Level]!` marker.
    pub fn from_name(name: &str) -> LogLevel {
        match name.to_ascii_lowercase().as_str() {
            "launcher" => LogLevel::Launcher,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "message" => LogLevel::Message,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "fatal" => LogLevel::Fatal,
            "stdout" => LogLevel::StdOut,
            "stderr" => LogLevel::StdErr,
            _ => LogLevel::Unknown,
        }
    }

    /// Extract an explicit level marker from a produced line.
    ///
    /// A cooperating launch stub prefixes lines with `!![Level]!`; when
    /// present the marker is stripped and its level returned.
    pub fn from_line(line: &str) -> Option<(LogLevel, &str)> {
        let rest = line.strip_prefix("!![")?;
        let end = rest.find("]!")?;
        Some((LogLevel::from_name(&rest[..end]), &rest[end + 2..]))
    }
}

static LOG4J_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[0-9:]+\] \[[^/]+/(?P<level>[^\]]+)\]").unwrap());

// Java identifier chains, for exception/stack-trace detection. The first
// section deliberately requires at least one package segment.
static JAVA_AT_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+at ([a-zA-Z_$][a-zA-Z\d_$]*\.)+[a-zA-Z_$][a-zA-Z\d_$]*").unwrap()
});
static JAVA_CAUSED_BY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Caused by: ([a-zA-Z_$][a-zA-Z\d_$]*\.)+[a-zA-Z_$][a-zA-Z\d_$]*").unwrap()
});
static JAVA_THROWABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-zA-Z_$][a-zA-Z\d_$]*\.)+[a-zA-Z_$]?[a-zA-Z\d_$]*(Exception|Error|Throwable)")
        .unwrap()
});

/// Guess a level for a line whose origin (stdout/stderr) did not determine
/// one. `default` is kept when nothing in the content says otherwise.
pub fn guess_level(line: &str, default: LogLevel) -> LogLevel {
    let mut level = default;

    if let Some(captures) = LOG4J_HEADER.captures(line) {
        // new style log4j output
        level = match &captures["level"] {
            "INFO" => LogLevel::Message,
            "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "FATAL" => LogLevel::Fatal,
            "TRACE" | "DEBUG" => LogLevel::Debug,
            _ => level,
        };
    } else {
        // old style forge logs
        if ["[INFO]", "[CONFIG]", "[FINE]", "[FINER]", "[FINEST]"]
            .iter()
            .any(|tag| line.contains(tag))
        {
            level = LogLevel::Message;
        }
        if line.contains("[SEVERE]") || line.contains("[STDERR]") {
            level = LogLevel::Error;
        }
        if line.contains("[WARNING]") {
            level = LogLevel::Warning;
        }
        if line.contains("[DEBUG]") {
            level = LogLevel::Debug;
        }
    }

    if line.contains("overwriting existing") {
        return LogLevel::Fatal;
    }

    if line.contains("Exception in thread")
        || JAVA_AT_FRAME.is_match(line)
        || JAVA_CAUSED_BY.is_match(line)
        || JAVA_THROWABLE.is_match(line)
    {
        return LogLevel::Error;
    }

    level
}
