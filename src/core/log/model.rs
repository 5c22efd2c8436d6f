// ─── Log Model ───
// Bounded circular buffer of leveled log lines backing the live log view.
//
// The logical line at position `i` lives in physical slot
// `(first + i) % max_lines`. Overflow either evicts the oldest line or,
// with stop-on-overflow set, replaces the last free slot with a synthetic
// Fatal notice and ignores everything after it until `clear()`.

use std::sync::Arc;

use crate::core::log::level::LogLevel;

pub const DEFAULT_MAX_LINES: usize = 1000;

const DEFAULT_OVERFLOW_MESSAGE: &str =
    "Stopped watching the game log because the log length surpassed the line limit.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

/// Incremental-change notifications, for binding a live view to the model.
/// Indices are logical row positions; removal always hits row 0 (the oldest
/// line), insertion always the current tail.
pub trait LogModelObserver: Send + Sync {
    fn rows_about_to_be_removed(&self, _first: usize, _last: usize) {}
    fn rows_removed(&self, _first: usize, _last: usize) {}
    fn rows_about_to_be_inserted(&self, _first: usize, _last: usize) {}
    fn rows_inserted(&self, _first: usize, _last: usize) {}
    fn model_reset(&self) {}
}

pub struct LogModel {
    content: Vec<LogLine>,
    first_line: usize,
    num_lines: usize,
    max_lines: usize,
    stop_on_overflow: bool,
    overflow_message: String,
    suspended: bool,
    observers: Vec<Arc<dyn LogModelObserver>>,
}

impl Default for LogModel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl LogModel {
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            content: Vec::with_capacity(max_lines.min(1024)),
            first_line: 0,
            num_lines: 0,
            max_lines,
            stop_on_overflow: false,
            overflow_message: DEFAULT_OVERFLOW_MESSAGE.into(),
            suspended: false,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn LogModelObserver>) {
        self.observers.push(observer);
    }

    pub fn set_stop_on_overflow(&mut self, stop: bool) {
        self.stop_on_overflow = stop;
    }

    pub fn set_overflow_message(&mut self, message: impl Into<String>) {
        self.overflow_message = message.into();
    }

    /// While suspended, `append` is a no-op; buffered content is kept.
    pub fn suspend(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn len(&self) -> usize {
        self.num_lines
    }

    pub fn is_empty(&self) -> bool {
        self.num_lines == 0
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Logical access in insertion order: 0 is the oldest retained line.
    pub fn get(&self, index: usize) -> Option<&LogLine> {
        if index >= self.num_lines {
            return None;
        }
        Some(&self.content[(self.first_line + index) % self.max_lines])
    }

    pub fn append(&mut self, level: LogLevel, text: impl Into<String>) {
        if self.suspended {
            return;
        }

        let slot = (self.first_line + self.num_lines) % self.max_lines;
        let mut line = LogLine {
            level,
            text: text.into(),
        };

        if self.num_lines == self.max_lines {
            if self.stop_on_overflow {
                // the overflow notice is already in place, nothing more is
                // recorded until clear()
                return;
            }
            for observer in &self.observers {
                observer.rows_about_to_be_removed(0, 0);
            }
            self.first_line = (self.first_line + 1) % self.max_lines;
            self.num_lines -= 1;
            for observer in &self.observers {
                observer.rows_removed(0, 0);
            }
        } else if self.num_lines == self.max_lines - 1 && self.stop_on_overflow {
            line = LogLine {
                level: LogLevel::Fatal,
                text: self.overflow_message.clone(),
            };
        }

        let row = self.num_lines;
        for observer in &self.observers {
            observer.rows_about_to_be_inserted(row, row);
        }
        if slot < self.content.len() {
            self.content[slot] = line;
        } else {
            self.content.push(line);
        }
        self.num_lines += 1;
        for observer in &self.observers {
            observer.rows_inserted(row, row);
        }
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.first_line = 0;
        self.num_lines = 0;
        for observer in &self.observers {
            observer.model_reset();
        }
    }

    /// Full buffer content, oldest first, one line per record.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for index in 0..self.num_lines {
            out.push_str(&self.content[(self.first_line + index) % self.max_lines].text);
            out.push('\n');
        }
        out
    }

    /// Resize the capacity. Content is linearized oldest-first into the new
    /// backing store; when shrinking, the oldest lines are discarded so the
    /// most recent ones survive.
    pub fn set_max_lines(&mut self, max_lines: usize) {
        let max_lines = max_lines.max(1);
        if max_lines == self.max_lines {
            return;
        }

        let keep = self.num_lines.min(max_lines);
        let skip = self.num_lines - keep;
        let mut linearized = Vec::with_capacity(keep);
        for index in skip..self.num_lines {
            linearized.push(self.content[(self.first_line + index) % self.max_lines].clone());
        }

        self.content = linearized;
        self.first_line = 0;
        self.num_lines = keep;
        self.max_lines = max_lines;
        for observer in &self.observers {
            observer.model_reset();
        }
    }
}
