pub mod api;
pub mod error;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// A running HTTP listener. Owned by whoever started it and consumed by
/// [`HttpServer::stop`].
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl HttpServer {
    /// Binds `addr` and starts serving `app` in the background.
    pub fn start(addr: SocketAddr, app: Router) -> Result<Self> {
        let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
        let local_addr = server.local_addr();

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            server
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await?;
            info!("HTTP server closed");
            Ok(())
        });

        info!(%local_addr, "EasyGo server listening");
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits briefly for in-flight requests.
    pub async fn stop(self) -> Result<()> {
        info!("EasyGo server shutdown");
        self.shutdown.cancel();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.task).await {
            Ok(joined) => joined?,
            Err(_) => bail!("server did not stop within {:?}", SHUTDOWN_GRACE),
        }
    }
}
