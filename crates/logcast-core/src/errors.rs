/// Errors raised on the path from a session to its output sink.
///
/// Encoding failures are recovered by dropping the single offending frame.
/// Sink failures are terminal for the owning session.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StreamError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("sink closed")]
    SinkClosed,
}

impl StreamError {
    /// Whether the session that hit this error must be torn down.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::SinkClosed => "sink_closed",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Encode(e.to_string())
    }
}

/// A listener failed to handle a delivered event.
#[derive(Clone, Debug, thiserror::Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);
