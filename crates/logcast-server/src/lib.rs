pub mod config;
pub mod http;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ConfigError, ServerConfig};
pub use server::{start, ServerHandle};
pub use session::{CloseReason, ConnectionSession, SessionState};
pub use transport::{ChannelSink, FrameSink, TransportAdapter, HEARTBEAT_FRAME};
