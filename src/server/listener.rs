//! MJPEG server listener
//!
//! Binds the TCP listener and serves the stream router with `axum::serve`.

use std::future::Future;
use std::net::SocketAddr;

use axum::serve::ListenerExt;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::broadcast::Broadcaster;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::handler;

/// MJPEG server
pub struct MjpegServer {
    config: ServerConfig,
    broadcaster: Broadcaster,
}

impl MjpegServer {
    /// Create a new server streaming the frames published to `broadcaster`
    pub fn new(config: ServerConfig, broadcaster: Broadcaster) -> Self {
        Self {
            config,
            broadcaster,
        }
    }

    /// Get the broadcaster feeding this server
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until binding or serving fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the listener stops accepting, every open stream is ended
    /// and the call returns once all connections have closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "MJPEG server listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let app = handler::router_with_shutdown(&self.config, self.broadcaster.clone(), stop_rx);

        let tcp_nodelay = self.config.tcp_nodelay;
        let listener = listener.tap_io(move |tcp| {
            if tcp_nodelay {
                if let Err(e) = tcp.set_nodelay(true) {
                    tracing::warn!(error = %e, "Failed to configure socket");
                }
            }
        });

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            let _ = stop_tx.send(true);
        })
        .await?;

        tracing::info!(addr = %addr, "MJPEG server stopped");
        Ok(())
    }
}
