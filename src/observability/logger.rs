//! Structured event logger on top of `tracing`
//!
//! - One log line = one event
//! - Event name first, fields in deterministic (alphabetical) order
//! - Output format and filtering belong to the installed subscriber

use std::fmt;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, the engine cannot serve
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emits named events through the global `tracing` dispatcher
pub struct Logger;

impl Logger {
    /// Log an event with the given severity and fields
    ///
    /// Fields are rendered in alphabetical key order.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let rendered = render_fields(fields);
        match severity {
            Severity::Trace => tracing::debug!(event = %event, fields = %rendered),
            Severity::Info => tracing::info!(event = %event, fields = %rendered),
            Severity::Warn => tracing::warn!(event = %event, fields = %rendered),
            Severity::Error => tracing::error!(event = %event, fields = %rendered),
            Severity::Fatal => tracing::error!(event = %event, fatal = true, fields = %rendered),
        }
    }

    /// Log at TRACE level
    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    /// Log at INFO level
    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

/// Renders `fields` as `key="value"` pairs sorted by key.
///
/// Values are JSON-escaped so a line never breaks.
pub fn render_fields(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let mut output = String::with_capacity(64);
    for (i, (key, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(key);
        output.push('=');
        match serde_json::to_string(value) {
            Ok(quoted) => output.push_str(&quoted),
            Err(_) => output.push_str("\"?\""),
        }
    }
    output
}
