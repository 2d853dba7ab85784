//! Wire framing for the text event stream and the sink it is written to.
//!
//! Two frame shapes exist: `data: <json>\n\n` carrying one [`LogEvent`], and
//! the comment-only `: heartbeat\n\n` keep-alive.

use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use logcast_core::{LogEvent, StreamError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

pub const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";

/// Encode one payload as a `data:` frame.
pub fn encode_data<T: Serialize + ?Sized>(payload: &T) -> Result<Bytes, StreamError> {
    let json = serde_json::to_vec(payload)?;
    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(Bytes::from(frame))
}

pub fn encode_event(event: &LogEvent) -> Result<Bytes, StreamError> {
    encode_data(event)
}

/// Destination of a session's frames.
pub trait FrameSink: Send + Sync {
    fn write(&self, frame: Bytes) -> Result<(), StreamError>;

    /// Best effort; never fails.
    fn close(&self);
}

/// Body chunk type of a streaming HTTP response.
pub type BodyChunk = Result<Bytes, Infallible>;

/// Sink feeding the unbounded channel that backs an HTTP response body.
///
/// Writes fail only once the receiver is dropped.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<BodyChunk>>>,
}

impl ChannelSink {
    /// Create the sink and the receiving half for the response body.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BodyChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn new(tx: mpsc::UnboundedSender<BodyChunk>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Resolves when the body side is dropped, i.e. the observer went away.
    ///
    /// The returned future holds a sender clone; drop it once the session
    /// closes or the response body never ends.
    pub fn receiver_dropped(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.lock().clone();
        async move {
            if let Some(tx) = tx {
                tx.closed().await;
            }
        }
    }
}

impl FrameSink for ChannelSink {
    fn write(&self, frame: Bytes) -> Result<(), StreamError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(StreamError::SinkClosed);
        };
        tx.send(Ok(frame)).map_err(|_| StreamError::SinkClosed)
    }

    fn close(&self) {
        // Dropping the sender ends the response body once queued frames drain.
        let _ = self.tx.lock().take();
    }
}

/// Encodes events and heartbeats and writes them to one session's sink.
pub struct TransportAdapter {
    sink: Box<dyn FrameSink>,
}

impl TransportAdapter {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self { sink }
    }

    /// Write one event frame.
    ///
    /// An event that fails to encode is logged and skipped with `Ok(())`;
    /// only sink failures are returned.
    pub fn send_event(&self, event: &LogEvent) -> Result<(), StreamError> {
        self.send_data(event)
    }

    pub(crate) fn send_data<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), StreamError> {
        match encode_data(payload) {
            Ok(frame) => self.sink.write(frame),
            Err(e) => {
                warn!(error = %e, "dropping event that failed to encode");
                Ok(())
            }
        }
    }

    pub fn send_heartbeat(&self) -> Result<(), StreamError> {
        self.sink.write(Bytes::from_static(HEARTBEAT_FRAME))
    }

    pub fn close(&self) {
        self.sink.close();
    }
}
