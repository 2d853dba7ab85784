use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Well-known event kinds. Producers may use any other string.
pub mod kind {
    pub const TRACE: &str = "TRACE";
    pub const DEBUG: &str = "DEBUG";
    pub const INFO: &str = "INFO";
    pub const WARN: &str = "WARN";
    pub const ERROR: &str = "ERROR";
}

/// Message of the event a session writes to its own transport on connect.
pub const CONNECTED_MESSAGE: &str = "Connected to log stream";

/// One log occurrence. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    kind: String,
    message: String,
    /// Milliseconds since the Unix epoch.
    emitted_at: i64,
}

impl LogEvent {
    /// Build an event stamped with the current time.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(kind, message, Utc::now().timestamp_millis())
    }

    pub fn at(kind: impl Into<String>, message: impl Into<String>, emitted_at: i64) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            emitted_at,
        }
    }

    /// The handshake event written directly to a new connection.
    ///
    /// It never passes through the bus, so other observers do not see it.
    pub fn connected() -> Self {
        Self::new(kind::INFO, CONNECTED_MESSAGE)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn emitted_at(&self) -> i64 {
        self.emitted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let event = LogEvent::at(kind::ERROR, "disk full", 1_700_000_000_123);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"ERROR","message":"disk full","emittedAt":1700000000123}"#
        );
    }

    #[test]
    fn new_stamps_current_time() {
        let before = Utc::now().timestamp_millis();
        let event = LogEvent::new("CUSTOM", "hello");
        let after = Utc::now().timestamp_millis();
        assert!(event.emitted_at() >= before && event.emitted_at() <= after);
        assert_eq!(event.kind(), "CUSTOM");
        assert_eq!(event.message(), "hello");
    }

    #[test]
    fn connected_event_is_info() {
        let event = LogEvent::connected();
        assert_eq!(event.kind(), kind::INFO);
        assert_eq!(event.message(), CONNECTED_MESSAGE);
    }

    #[test]
    fn message_with_newlines_stays_on_one_line() {
        let event = LogEvent::at(kind::WARN, "line one\nline two", 1);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains('\n'));
        let parsed: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.message(), "line one\nline two");
    }
}
