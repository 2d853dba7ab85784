//! Server-side state for one observer's streaming connection.
//!
//! ```text
//! Opening ──(connected frame written, subscribed)──► Active
//!    │                                                  │
//!    │ initial write fails          disconnect / write failure / shutdown
//!    ▼                                                  ▼
//!  Closing ◄────────────────────────────────────────────┘
//!    │ stop heartbeat, unsubscribe, close sink (each exactly once)
//!    ▼
//!  Closed
//! ```
//!
//! The connected frame is written straight to the transport and never
//! published, so it is visible only to the session it greets.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use logcast_core::{
    DeliveryError, EventBus, Listener, LogEvent, SessionId, StreamError, Subscription,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{FrameSink, TransportAdapter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Active,
    Closing,
    Closed,
}

/// Why a session was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Disconnected,
    WriteFailed,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::WriteFailed => "write_failed",
            Self::Shutdown => "shutdown",
        })
    }
}

struct SessionInner {
    state: SessionState,
    transport: TransportAdapter,
    subscription: Option<Subscription>,
    heartbeat: Option<JoinHandle<()>>,
}

pub struct ConnectionSession {
    id: SessionId,
    bus: Arc<EventBus>,
    inner: Mutex<SessionInner>,
    closed: CancellationToken,
}

impl ConnectionSession {
    /// Greet the observer, subscribe to `bus` and start the heartbeat.
    ///
    /// Must be called from within a tokio runtime. If the greeting cannot be
    /// written the returned session is already `Closed`.
    pub fn open(
        bus: Arc<EventBus>,
        sink: Box<dyn FrameSink>,
        heartbeat_interval: Duration,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id: SessionId::new(),
            bus,
            inner: Mutex::new(SessionInner {
                state: SessionState::Opening,
                transport: TransportAdapter::new(sink),
                subscription: None,
                heartbeat: None,
            }),
            closed: CancellationToken::new(),
        });

        let greeted = session.inner.lock().transport.send_event(&LogEvent::connected());
        if let Err(e) = greeted {
            warn!(session_id = %session.id, error = %e, "failed to write connected frame");
            session.close(CloseReason::WriteFailed);
            return session;
        }

        // Active before subscribing, so the first bus event is not dropped.
        session.inner.lock().state = SessionState::Active;

        let listener = SessionListener {
            session: Arc::downgrade(&session),
        };
        let subscription = session.bus.subscribe(Arc::new(listener));

        let mut inner = session.inner.lock();
        if inner.state != SessionState::Active {
            // A write failure closed the session before the handle was stored.
            drop(inner);
            session.bus.unsubscribe(&subscription);
            return session;
        }
        inner.subscription = Some(subscription);
        inner.heartbeat = Some(spawn_heartbeat(Arc::downgrade(&session), heartbeat_interval));
        drop(inner);

        info!(session_id = %session.id, "log stream session opened");
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Resolves once the session has reached `Closed`.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Forward one bus event. A sink failure closes the session.
    pub fn deliver(&self, event: &LogEvent) -> Result<(), StreamError> {
        let result = {
            let inner = self.inner.lock();
            if inner.state != SessionState::Active {
                return Ok(());
            }
            inner.transport.send_event(event)
        };
        self.on_write_result(result, "event")
    }

    /// Write one keep-alive frame. A sink failure closes the session.
    pub fn heartbeat(&self) -> Result<(), StreamError> {
        let result = {
            let inner = self.inner.lock();
            if inner.state != SessionState::Active {
                return Err(StreamError::SinkClosed);
            }
            inner.transport.send_heartbeat()
        };
        self.on_write_result(result, "heartbeat")
    }

    fn on_write_result(
        &self,
        result: Result<(), StreamError>,
        frame: &'static str,
    ) -> Result<(), StreamError> {
        if let Err(e) = &result {
            warn!(
                session_id = %self.id,
                frame,
                error_kind = e.error_kind(),
                error = %e,
                "stream write failed"
            );
            self.close(CloseReason::WriteFailed);
        }
        result
    }

    /// Tear the session down. Returns `true` only for the call that did it.
    ///
    /// Safe to call from any thread, repeatedly and concurrently; the
    /// heartbeat is stopped, the subscription released and the sink closed
    /// exactly once.
    pub fn close(&self, reason: CloseReason) -> bool {
        let (subscription, heartbeat) = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, SessionState::Closing | SessionState::Closed) {
                return false;
            }
            inner.state = SessionState::Closing;
            (inner.subscription.take(), inner.heartbeat.take())
        };

        if let Some(handle) = heartbeat {
            handle.abort();
        }
        if let Some(subscription) = subscription {
            self.bus.unsubscribe(&subscription);
        }
        {
            let mut inner = self.inner.lock();
            inner.transport.close();
            inner.state = SessionState::Closed;
        }
        self.closed.cancel();

        info!(session_id = %self.id, reason = %reason, "log stream session closed");
        true
    }

    /// Close the session once `signal` resolves, with the reason it yields.
    ///
    /// The watcher also exits when the session closes for any other reason,
    /// releasing whatever `signal` holds.
    pub fn close_on<F>(self: &Arc<Self>, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = CloseReason> + Send + 'static,
    {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                reason = signal => {
                    debug!(session_id = %session.id, reason = %reason, "close signal received");
                    session.close(reason);
                }
                () = session.closed() => {}
            }
        })
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(handle) = inner.heartbeat.take() {
            handle.abort();
        }
        if let Some(subscription) = inner.subscription.take() {
            self.bus.unsubscribe(&subscription);
        }
    }
}

/// Bus listener for one session. Holds the session weakly so the bus never
/// keeps a dropped session alive.
///
/// The session logs and handles its own write failures; `on_event` always
/// returns `Ok`.
struct SessionListener {
    session: Weak<ConnectionSession>,
}

impl Listener for SessionListener {
    fn on_event(&self, event: &Arc<LogEvent>) -> Result<(), DeliveryError> {
        if let Some(session) = self.session.upgrade() {
            let _ = session.deliver(event);
        }
        Ok(())
    }
}

fn spawn_heartbeat(session: Weak<ConnectionSession>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            if session.heartbeat().is_err() {
                break;
            }
        }
    })
}
