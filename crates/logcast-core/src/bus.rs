//! In-process publish/subscribe for [`LogEvent`]s.
//!
//! The bus holds no history: a listener only sees events published while it
//! is subscribed. Delivery is a synchronous callback per listener, in
//! subscription order, and never waits on I/O.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::errors::DeliveryError;
use crate::event::LogEvent;
use crate::ids::SubscriptionId;

thread_local! {
    static DELIVERY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Receives every event published while subscribed.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Arc<LogEvent>) -> Result<(), DeliveryError>;
}

impl<F> Listener for F
where
    F: Fn(&Arc<LogEvent>) -> Result<(), DeliveryError> + Send + Sync,
{
    fn on_event(&self, event: &Arc<LogEvent>) -> Result<(), DeliveryError> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }
}

/// Process-wide event broadcaster. Share it as `Arc<EventBus>`.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn Listener>)>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer entry point: stamp the event with the current time and publish it.
    pub fn emit(&self, kind: impl Into<String>, message: impl Into<String>) {
        self.publish(LogEvent::new(kind, message));
    }

    /// Deliver `event` to every current listener.
    ///
    /// Listener failures and panics are logged and swallowed. A failing
    /// listener stays subscribed until its owner unsubscribes it.
    pub fn publish(&self, event: LogEvent) {
        let event = Arc::new(event);
        // Snapshot so listeners can unsubscribe from inside `on_event`.
        let listeners: Vec<(SubscriptionId, Arc<dyn Listener>)> = self.listeners.read().clone();

        let _guard = DeliveryGuard::enter();
        debug!(
            kind = event.kind(),
            message = event.message(),
            recipients = listeners.len(),
            "log emitted"
        );

        for (id, listener) in &listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(subscription_id = %id, error = %e, "listener failed");
                }
                Err(payload) => {
                    error!(
                        subscription_id = %id,
                        panic = panic_message(payload.as_ref()),
                        "listener panicked"
                    );
                }
            }
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn Listener>) -> Subscription {
        let id = SubscriptionId::new();
        self.listeners.write().push((id.clone(), listener));
        debug!(subscription_id = %id, "listener subscribed");
        Subscription { id }
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| id != &subscription.id);
        let removed = listeners.len() != before;
        drop(listeners);
        if removed {
            debug!(subscription_id = %subscription.id, "listener unsubscribed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// True while the current thread is inside [`EventBus::publish`].
    pub fn is_delivering() -> bool {
        DELIVERY_DEPTH.with(|d| d.get() > 0)
    }
}

struct DeliveryGuard;

impl DeliveryGuard {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
