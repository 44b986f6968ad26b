//! The user-facing activity log: one timestamped line per state
//! transition or error, append-only.
//!
//! Logging here is best-effort. An unwritable destination must never
//! abort a session, so failures are reported once through tracing and
//! then swallowed.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;
use tracing::warn;

/// Severity of an activity log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

/// Appends timestamped entries to a flat log file. Single writer, so
/// entries are strictly time-ordered and never rewritten.
pub struct ActivityLogger {
    file: Option<File>,
}

impl ActivityLogger {
    /// Open the log file for appending, creating parent directories as
    /// needed. On failure the logger is disabled rather than fatal.
    pub fn open(path: &Path) -> Self {
        let file = Self::try_open(path);
        if file.is_none() {
            warn!(path = ?path, "Activity log is unwritable; entries will be dropped");
        }
        Self { file }
    }

    /// A logger that drops every entry. Useful when no log is wanted.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    fn try_open(path: &Path) -> Option<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    }

    /// Append one entry. Errors are swallowed.
    pub fn log(&mut self, level: Level, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let line = format!(
            "{} {} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.as_str(),
            message
        );
        file.write_all(line.as_bytes()).ok();
    }

    pub fn info(&mut self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warning(&mut self, message: &str) {
        self.log(Level::Warning, message);
    }

    pub fn error(&mut self, message: &str) {
        self.log(Level::Error, message);
    }
}
