use std::net::SocketAddr;
use std::sync::Arc;

use logcast_core::EventBus;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::http::{build_router, AppState};

/// Bind the listener and serve the log stream. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    bus: Arc<EventBus>,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();

    let state = AppState {
        bus,
        config: Arc::new(config),
        shutdown: shutdown.clone(),
    };
    let router = build_router(state);

    tracing::info!(addr = %local_addr, "logcast server started");

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        local_addr,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    pub local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Close every session, stop accepting connections and wait for the server task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task did not finish cleanly");
        }
    }
}
