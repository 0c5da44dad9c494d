//! Observability for the validation engine
//!
//! - Typed lifecycle events ([`Event`])
//! - Deterministic field rendering on top of `tracing`
//! - Subscriber installation for the `cvl` binary ([`init_logging`])
//!
//! Library code only emits events; installing a subscriber is the
//! embedding application's choice.

mod events;
mod logger;

pub use events::Event;
pub use logger::{render_fields, Logger, Severity};

use thiserror::Error;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line text: timestamp LEVEL target fields
    Compact,
    /// JSON Lines
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Subscriber installation failure
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// Builds the filter from the base level; `RUST_LOG` wins when set.
fn build_env_filter(level: &str) -> Result<EnvFilter, ObservabilityError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| ObservabilityError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global fmt subscriber writing to stderr.
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_logging(level: &str, format: &str) -> Result<(), ObservabilityError> {
    let filter = build_env_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when a global subscriber already exists
    let _ = match LogFormat::parse(format) {
        LogFormat::Json => builder.json().finish().try_init(),
        LogFormat::Compact => builder.compact().finish().try_init(),
    };
    Ok(())
}

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
