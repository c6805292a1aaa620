//! Operator-facing diagnostic stream.
//!
//! Every import run owns a [`Diagnostics`] sink. Entries are kept for the
//! caller (and the final report) and, when echo is on, printed to stderr
//! so they never mix with the primary output on stdout.

use serde::{Deserialize, Serialize};

/// Log level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single diagnostic entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Indentation level (for nested output such as entity dumps)
    #[serde(default)]
    pub indent: u8,
    /// 1-based row number the entry refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into(), indent: 0, row: None }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Render the entry the way it is echoed to stderr.
    pub fn render(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(self.indent as usize);
        match self.row {
            Some(row) => format!("{}{} [row {}] {}", indent, prefix, row, self.message),
            None => format!("{}{} {}", indent, prefix, self.message),
        }
    }
}

/// Collects diagnostics for one import run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    echo: bool,
    entries: Vec<LogEntry>,
}

impl Diagnostics {
    /// A sink that echoes every entry to stderr.
    pub fn stderr() -> Self {
        Self { echo: true, entries: Vec::new() }
    }

    /// A sink that only records entries.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Record an entry, echoing it when enabled.
    pub fn log(&mut self, entry: LogEntry) {
        if self.echo {
            eprintln!("{}", entry.render());
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::info(msg));
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::success(msg));
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::warning(msg));
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::error(msg));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries at the given level.
    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
