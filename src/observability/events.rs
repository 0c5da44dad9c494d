//! Observable lifecycle events of the validation engine
//!
//! Events are explicit and typed; each maps to a stable upper-case name
//! that log consumers can match on.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Engine lifecycle
    ConfigLoaded,
    /// Schema index built
    SchemaLoaded,
    /// Schema could not be loaded (FATAL)
    SchemaLoadFailed,
    EngineStart,
    EngineShutdown,

    // Sessions
    SessionOpen,
    SessionClose,
    /// An edit batch passed validation
    ValidationAccepted,
    /// An edit batch was rejected
    ValidationRejected,

    // Dependency resolution
    /// Dependent table data assembled
    DependenciesResolved,
    /// One pipelined bulk fetch issued
    FetchBatch,

    // Global cache
    /// Cached table populated from the store
    CacheBuild,
    CacheHit,
    CacheMiss,
    CacheInvalidate,
    /// Keyspace notification folded into a cached table
    NotificationApplied,
    /// Keyspace notification could not be applied
    NotificationFailed,
    /// Listener subscription recreated for a new table set
    ListenerResubscribed,
    ListenerStopped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemaLoaded => "SCHEMA_LOADED",
            Event::SchemaLoadFailed => "SCHEMA_LOAD_FAILED",
            Event::EngineStart => "ENGINE_START",
            Event::EngineShutdown => "ENGINE_SHUTDOWN",

            Event::SessionOpen => "SESSION_OPEN",
            Event::SessionClose => "SESSION_CLOSE",
            Event::ValidationAccepted => "VALIDATION_ACCEPTED",
            Event::ValidationRejected => "VALIDATION_REJECTED",

            Event::DependenciesResolved => "DEPENDENCIES_RESOLVED",
            Event::FetchBatch => "FETCH_BATCH",

            Event::CacheBuild => "CACHE_BUILD",
            Event::CacheHit => "CACHE_HIT",
            Event::CacheMiss => "CACHE_MISS",
            Event::CacheInvalidate => "CACHE_INVALIDATE",
            Event::NotificationApplied => "NOTIFICATION_APPLIED",
            Event::NotificationFailed => "NOTIFICATION_FAILED",
            Event::ListenerResubscribed => "LISTENER_RESUBSCRIBED",
            Event::ListenerStopped => "LISTENER_STOPPED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::SchemaLoadFailed)
    }

    /// Default severity the event is logged at
    pub fn severity(&self) -> super::Severity {
        use super::Severity;
        match self {
            Event::SchemaLoadFailed => Severity::Fatal,
            Event::ValidationRejected | Event::NotificationFailed => Severity::Warn,
            Event::CacheHit | Event::CacheMiss | Event::FetchBatch | Event::DependenciesResolved => {
                Severity::Trace
            }
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::SchemaLoaded,
            Event::SchemaLoadFailed,
            Event::EngineStart,
            Event::EngineShutdown,
            Event::SessionOpen,
            Event::SessionClose,
            Event::ValidationAccepted,
            Event::ValidationRejected,
            Event::DependenciesResolved,
            Event::FetchBatch,
            Event::CacheBuild,
            Event::CacheHit,
            Event::CacheMiss,
            Event::CacheInvalidate,
            Event::NotificationApplied,
            Event::NotificationFailed,
            Event::ListenerResubscribed,
            Event::ListenerStopped,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::SchemaLoadFailed.is_fatal());
        assert!(!Event::SessionOpen.is_fatal());
        assert_eq!(Event::SchemaLoadFailed.severity(), Severity::Fatal);
        assert_eq!(Event::ValidationRejected.severity(), Severity::Warn);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::CacheBuild), "CACHE_BUILD");
    }
}
