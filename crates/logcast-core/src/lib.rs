pub mod bus;
pub mod errors;
pub mod event;
pub mod ids;

pub use bus::{EventBus, Listener, Subscription};
pub use errors::{DeliveryError, StreamError};
pub use event::LogEvent;
pub use ids::{SessionId, SubscriptionId};
