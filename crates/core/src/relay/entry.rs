use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Error,
    /// High frequency progress ticks, never persisted.
    Progress,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Progress => "progress",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log or progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, for display.
    pub timestamp: String,
    pub iso_timestamp: DateTime<Utc>,
    /// Component that produced the entry (`scheduler`, `converter`, ...).
    pub module: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            timestamp: now
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            iso_timestamp: now,
            module: module.into(),
            message: message.into(),
            data: None,
            level,
        }
    }

    pub fn info(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, module, message)
    }

    pub fn error(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, module, message)
    }

    pub fn progress(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Progress, module, message)
    }

    /// Attaches a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Single-line text rendering, without the payload.
    pub fn format_line(&self) -> String {
        match self.level {
            LogLevel::Error => format!(
                "[{}] [{}] ERROR: {}",
                self.timestamp, self.module, self.message
            ),
            _ => format!("[{}] [{}] {}", self.timestamp, self.module, self.message),
        }
    }

    /// Text block as written to the log file: the line plus the indented payload.
    pub fn format_block(&self) -> String {
        let mut block = self.format_line();
        if let Some(data) = &self.data {
            let rendered =
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            for line in rendered.lines() {
                block.push_str("\n  ");
                block.push_str(line);
            }
        }
        block.push('\n');
        block
    }
}
