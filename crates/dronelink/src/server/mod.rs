//! TCP ingestion server.
//!
//! One listening socket; every accepted connection gets its own task running
//! a [`ConnectionHandler`]. There is no upper bound on concurrent
//! connections. The server holds no telemetry state of its own: handlers
//! push straight into the shared pipeline queue.
//!
//! The accept loop stops when the context's shutdown token is cancelled.
//! Handlers already running are not cancelled; they end on `!DISCONNECT`
//! or when their transport closes.

mod connection;
mod stats;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::pipeline::PipelineContext;

pub use connection::{ConnectionHandler, ConnectionSession};
pub use stats::{ServerStats, StatsSnapshot};

/// Accepts producer connections and spawns a handler for each.
#[derive(Debug)]
pub struct IngestionServer {
    config: ServerConfig,
    context: PipelineContext,
    stats: Arc<ServerStats>,
}

impl IngestionServer {
    /// Create a server that feeds `context`'s queue.
    #[must_use]
    pub fn new(config: ServerConfig, context: PipelineContext) -> Self {
        Self {
            config,
            context,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Shared counters, valid after the server is gone.
    #[must_use]
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.config.bind_address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| Error::Bind { address, source })
    }

    /// Bind and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the accept loop on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!(address = %local, "ingestion server listening");

        let shutdown = self.context.shutdown().clone();
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                result = listener.accept() => match result {
                    Ok((stream, peer)) => self.spawn_handler(stream, peer),
                    // Transient (EMFILE, ECONNABORTED): keep accepting
                    Err(e) => warn!(error = %e, "accept error"),
                },
            }
        }

        info!(
            address = %local,
            active = self.stats.active(),
            "ingestion server stopped accepting"
        );
        Ok(())
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        let active = self.stats.connection_opened();
        info!(peer = %peer, active, "connection accepted");

        let mut handler = ConnectionHandler::new(
            stream,
            peer,
            self.context.queue().clone(),
            Arc::clone(&self.stats),
            self.config.max_payload_bytes,
        );
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            match handler.run().await {
                Ok(()) => {}
                Err(e) if e.is_disconnect() => {
                    stats.connection_error();
                    debug!(peer = %peer, error = %e, "connection dropped");
                }
                Err(e) => {
                    stats.connection_error();
                    warn!(peer = %peer, error = %e, "connection aborted");
                }
            }

            let active = stats.connection_closed();
            info!(peer = %peer, active, "connection closed");
        });
    }
}
