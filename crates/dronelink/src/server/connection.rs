//! Per-connection read loop.
//!
//! ```text
//! AWAIT_HEADER -> AWAIT_PAYLOAD -> DISPATCH -> AWAIT_HEADER
//!                                          \-> CLOSED
//! ```
//!
//! The handler's only side effects are pushes onto the pipeline queue and
//! I/O on its own transport. Nothing it does can fail another connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::stats::ServerStats;
use crate::pipeline::{PipelineEvent, PipelineSender};
use crate::protocol::{decode_message, ConnectionError, DecodeError, FrameReader, Message};

/// State of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSession {
    peer: SocketAddr,
    connected: bool,
}

impl ConnectionSession {
    /// A freshly accepted, connected session.
    #[must_use]
    pub const fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            connected: true,
        }
    }

    /// Remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// False once the peer has asked to disconnect or the transport closed.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Reads framed messages off one transport and routes them into the pipeline.
#[derive(Debug)]
pub struct ConnectionHandler<S> {
    session: ConnectionSession,
    reader: FrameReader<S>,
    queue: PipelineSender,
    stats: Arc<ServerStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted stream.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        queue: PipelineSender,
        stats: Arc<ServerStats>,
        max_payload: usize,
    ) -> Self {
        Self {
            session: ConnectionSession::new(peer),
            reader: FrameReader::with_max_payload(stream, max_payload),
            queue,
            stats,
        }
    }

    /// Current session state.
    #[must_use]
    pub fn session(&self) -> ConnectionSession {
        self.session
    }

    /// Serve the connection until the peer disconnects or the stream fails.
    ///
    /// The transport is shut down on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the framing or transport error that ended the connection.
    /// Unknown message types are logged and skipped, not returned.
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        let result = self.read_loop().await;
        self.session.connected = false;

        if let Err(e) = self.reader.get_mut().shutdown().await {
            trace!(peer = %self.session.peer, error = %e, "shutdown after close failed");
        }
        result
    }

    async fn read_loop(&mut self) -> Result<(), ConnectionError> {
        while self.session.connected {
            let Some(payload) = self.reader.read_frame().await? else {
                debug!(peer = %self.session.peer, "peer closed connection");
                return Ok(());
            };

            match decode_message(&payload) {
                Ok(message) => {
                    self.stats.message_received();
                    self.dispatch(message);
                }
                Err(DecodeError::Protocol(e)) => {
                    self.stats.protocol_error();
                    warn!(peer = %self.session.peer, error = %e, "ignoring message");
                }
                Err(DecodeError::Framing(e)) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, message: Message) {
        debug!(
            peer = %self.session.peer,
            msg_type = message.msg_type(),
            "dispatching message"
        );

        let event = match message {
            Message::LastPointsConfig { last_points_number } => {
                PipelineEvent::Capacity(last_points_number)
            }
            Message::Coordinates { coords } => PipelineEvent::Batch(coords),
            Message::End => PipelineEvent::End,
            Message::Disconnect => {
                self.session.connected = false;
                return;
            }
        };

        if self.queue.push(event).is_err() {
            warn!(peer = %self.session.peer, "pipeline queue closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::pipeline::{queue, PipelineReceiver, Popped};
    use crate::protocol::{encode_frame, FramingError, PointRecord, DEFAULT_MAX_PAYLOAD};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn handler(stream: DuplexStream) -> (ConnectionHandler<DuplexStream>, PipelineReceiver) {
        let (tx, rx) = queue();
        let handler = ConnectionHandler::new(
            stream,
            peer(),
            tx,
            Arc::new(ServerStats::new()),
            DEFAULT_MAX_PAYLOAD,
        );
        (handler, rx)
    }

    fn frame(message: &Message) -> Vec<u8> {
        message.to_frame().unwrap()
    }

    fn coords(points: &[(f64, f64, f64)]) -> Message {
        Message::Coordinates {
            coords: points
                .iter()
                .map(|&(x, y, z)| PointRecord::new(x, y, z))
                .collect(),
        }
    }

    async fn drain(rx: &mut PipelineReceiver) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Popped::Event(event) = rx.pop_timeout(Duration::from_millis(20)).await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_dispatch_in_order_until_disconnect() {
        let (mut client, server) = duplex(64 * 1024);
        let (mut handler, mut rx) = handler(server);

        for message in [
            Message::LastPointsConfig {
                last_points_number: 3,
            },
            coords(&[(1.0, 2.0, 3.0), (4.0, 5.0, 6.0)]),
            Message::End,
            coords(&[(7.0, 8.0, 9.0)]),
            Message::Disconnect,
            // Never read: the loop ends on disconnect
            coords(&[(0.0, 0.0, 0.0)]),
        ] {
            client.write_all(&frame(&message)).await.unwrap();
        }

        handler.run().await.unwrap();
        assert!(!handler.session().is_connected());

        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![
                PipelineEvent::Capacity(3),
                PipelineEvent::Batch(vec![
                    PointRecord::new(1.0, 2.0, 3.0),
                    PointRecord::new(4.0, 5.0, 6.0),
                ]),
                PipelineEvent::End,
                PipelineEvent::Batch(vec![PointRecord::new(7.0, 8.0, 9.0)]),
            ]
        );
        assert_eq!(handler.stats.snapshot().messages_received, 5);
    }

    #[tokio::test]
    async fn test_end_does_not_close_connection() {
        let (mut client, server) = duplex(4096);
        let (mut handler, mut rx) = handler(server);

        client.write_all(&frame(&Message::End)).await.unwrap();
        let task = tokio::spawn(async move {
            let result = handler.run().await;
            (handler, result)
        });

        assert_eq!(
            rx.pop_timeout(Duration::from_secs(5)).await,
            Popped::Event(PipelineEvent::End)
        );
        assert!(!task.is_finished());

        client
            .write_all(&frame(&coords(&[(1.0, 1.0, 1.0)])))
            .await
            .unwrap();
        client.write_all(&frame(&Message::Disconnect)).await.unwrap();

        let (_, result) = task.await.unwrap();
        result.unwrap();
        assert!(matches!(
            rx.pop_timeout(Duration::from_secs(5)).await,
            Popped::Event(PipelineEvent::Batch(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_is_skipped() {
        let (mut client, server) = duplex(4096);
        let (mut handler, mut rx) = handler(server);

        client
            .write_all(&encode_frame(br#"{"msg_type":"battery","level":0.5}"#))
            .await
            .unwrap();
        client
            .write_all(&encode_frame(
                br#"{"msg_type":"last_points_number","last_points_number":0}"#,
            ))
            .await
            .unwrap();
        client
            .write_all(&frame(&coords(&[(1.0, 2.0, 3.0)])))
            .await
            .unwrap();
        client.write_all(&frame(&Message::Disconnect)).await.unwrap();

        handler.run().await.unwrap();

        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![PipelineEvent::Batch(vec![PointRecord::new(1.0, 2.0, 3.0)])]
        );
        let stats = handler.stats.snapshot();
        assert_eq!(stats.protocol_errors, 2);
        assert_eq!(stats.messages_received, 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_aborts_connection() {
        let (mut client, server) = duplex(4096);
        let (mut handler, mut rx) = handler(server);

        client
            .write_all(&frame(&coords(&[(1.0, 2.0, 3.0)])))
            .await
            .unwrap();
        client.write_all(&encode_frame(b"{not json")).await.unwrap();
        client
            .write_all(&frame(&coords(&[(4.0, 5.0, 6.0)])))
            .await
            .unwrap();

        let err = handler.run().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Framing(FramingError::MalformedPayload { .. })
        ));
        assert!(!err.is_disconnect());

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_header_aborts_connection() {
        let (mut client, server) = duplex(4096);
        let (mut handler, _rx) = handler(server);

        client.write_all(&[b'x'; 64]).await.unwrap();

        let err = handler.run().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Framing(FramingError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_without_disconnect() {
        let (mut client, server) = duplex(4096);
        let (mut handler, mut rx) = handler(server);

        client
            .write_all(&frame(&coords(&[(1.0, 2.0, 3.0)])))
            .await
            .unwrap();
        drop(client);

        handler.run().await.unwrap();
        assert!(!handler.session().is_connected());
        assert_eq!(drain(&mut rx).await.len(), 1);
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_disconnect() {
        let (mut client, server) = duplex(4096);
        let (mut handler, _rx) = handler(server);

        let bytes = frame(&coords(&[(1.0, 2.0, 3.0)]));
        client.write_all(&bytes[..bytes.len() - 5]).await.unwrap();
        drop(client);

        let err = handler.run().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_push_after_queue_closed_keeps_reading() {
        let (mut client, server) = duplex(4096);
        let (mut handler, rx) = handler(server);
        drop(rx);

        client
            .write_all(&frame(&coords(&[(1.0, 2.0, 3.0)])))
            .await
            .unwrap();
        client.write_all(&frame(&Message::Disconnect)).await.unwrap();

        handler.run().await.unwrap();
        assert_eq!(handler.stats.snapshot().messages_received, 2);
    }

    #[test]
    fn test_session_starts_connected() {
        let session = ConnectionSession::new(peer());
        assert!(session.is_connected());
        assert_eq!(session.peer(), peer());
    }
}
