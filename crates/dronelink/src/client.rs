//! Producer side of the wire protocol.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{encode_frame, Message};

/// A framed TCP connection to an ingestion server.
#[derive(Debug)]
pub struct TelemetryClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TelemetryClient {
    /// Connect to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the server cannot be reached.
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| Error::Connect {
                address: address.to_string(),
                source,
            })?;
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        debug!(peer = %peer, "connected to ingestion server");
        Ok(Self { stream, peer })
    }

    /// Address of the server.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Serialize, frame and write one message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.to_frame()?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Frame and write an arbitrary payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(&encode_frame(payload)).await?;
        Ok(())
    }

    /// Send `!DISCONNECT` and close the write half.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the shutdown fails.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&Message::Disconnect).await?;
        self.shutdown().await
    }

    /// Close the write half without saying goodbye.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
