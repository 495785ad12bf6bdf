use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::sleep};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message, Utf8Bytes},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    error::{RelayError, Result},
    protocol::{InboundMessage, OutboundMessage},
};

/// Delay before the first reconnection attempt
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the reconnection delay
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Something that happened on the server connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection to the server was established
    Connected,
    /// The server sent a message
    Message(InboundMessage),
    /// The connection dropped; a reconnect will follow
    Disconnected,
}

/// Capability to deliver messages to the server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue a message for delivery
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Turn a socket server URL into a WebSocket endpoint
///
/// `http` and `https` map to `ws` and `wss`; WebSocket URLs pass through.
///
/// # Errors
///
/// Returns [`RelayError::InvalidUrl`] for any other scheme.
pub fn websocket_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let (scheme, rest) = trimmed.split_once("://").ok_or_else(|| RelayError::InvalidUrl {
        url: url.to_string(),
    })?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => {
            return Err(RelayError::InvalidUrl {
                url: url.to_string(),
            })
        }
    };

    if rest.is_empty() {
        return Err(RelayError::InvalidUrl {
            url: url.to_string(),
        });
    }

    Ok(format!("{scheme}://{rest}"))
}

/// WebSocket connection to the race server
///
/// Outbound messages are queued and written by a background task that keeps
/// the connection alive, reconnecting with a growing delay whenever it drops.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Utf8Bytes>,
    task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Start connecting to `url` in the background
    ///
    /// Returns the transport and the stream of connection events.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] if `url` is not an HTTP or WebSocket URL.
    pub fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let endpoint = websocket_url(url)?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(connection_loop(endpoint, outbound_rx, event_tx));

        Ok((
            Self {
                outbound: outbound_tx,
                task,
            },
            event_rx,
        ))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let text = message.to_json()?;
        self.outbound
            .send(text.into())
            .map_err(|_| RelayError::TransportClosed)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type ServerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open one WebSocket connection to `endpoint`
///
/// `wss` endpoints go through rustls with the ring provider, installed on
/// first use.
async fn open(endpoint: &str) -> tungstenite::Result<ServerStream> {
    // Already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let (stream, _) = connect_async(endpoint).await?;
    Ok(stream)
}

enum SessionEnd {
    /// Server side went away; reconnect
    Dropped,
    /// The transport was dropped or nobody listens for events; stop
    Shutdown,
}

async fn connection_loop(
    endpoint: String,
    mut outbound: mpsc::UnboundedReceiver<Utf8Bytes>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut delay = INITIAL_RECONNECT_DELAY;

    loop {
        match open(&endpoint).await {
            Ok(stream) => {
                info!("Connected to {endpoint}");
                delay = INITIAL_RECONNECT_DELAY;

                if events.send(TransportEvent::Connected).is_err() {
                    return;
                }

                match run_session(stream, &mut outbound, &events).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Dropped => {
                        if events.send(TransportEvent::Disconnected).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => warn!("Connection to {endpoint} failed: {e}"),
        }

        debug!("Reconnecting in {}ms", delay.as_millis());
        sleep(delay).await;
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

async fn run_session(
    stream: ServerStream,
    outbound: &mut mpsc::UnboundedReceiver<Utf8Bytes>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> SessionEnd {
    let (mut writer, mut reader) = stream.split();

    loop {
        tokio::select! {
            frame = reader.next() => {
                let inbound = match frame {
                    Some(Ok(Message::Text(text))) => InboundMessage::parse(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => InboundMessage::parse(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Server closed the connection");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("Connection error: {e}");
                        return SessionEnd::Dropped;
                    }
                };

                if let Some(message) = inbound {
                    if events.send(TransportEvent::Message(message)).is_err() {
                        let _ = writer.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
            queued = outbound.recv() => {
                let Some(text) = queued else {
                    let _ = writer.close().await;
                    return SessionEnd::Shutdown;
                };
                if let Err(e) = writer.send(Message::Text(text)).await {
                    warn!("Failed to send message: {e}");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_websocket_url_mapping() {
        assert_eq!(
            websocket_url("http://localhost:8080").unwrap(),
            "ws://localhost:8080"
        );
        assert_eq!(
            websocket_url("https://race.example.com/socket").unwrap(),
            "wss://race.example.com/socket"
        );
        assert_eq!(websocket_url("ws://10.0.0.2:9000").unwrap(), "ws://10.0.0.2:9000");
        assert_eq!(websocket_url(" HTTP://host ").unwrap(), "ws://host");
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://host"),
            Err(RelayError::InvalidUrl { .. })
        ));
        assert!(websocket_url("localhost:8080").is_err());
        assert!(websocket_url("http://").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_with_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            let received = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => {}
                    other => panic!("unexpected frame: {other:?}"),
                }
            };

            ws.send(Message::Text(
                r#"{"message":"session-start","distance":150}"#.into(),
            ))
            .await
            .unwrap();
            received
        });

        let (transport, mut events) =
            WebSocketTransport::connect(&format!("http://{address}")).unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        transport
            .send(&OutboundMessage::checkin("Rower0001"))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Message(InboundMessage::SessionStart {
                distance: 150
            }))
        );

        let received = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&received).unwrap();
        assert_eq!(value["message"], "rower-checkin");
        assert_eq!(value["name"], "Rower0001");
    }

    #[tokio::test]
    async fn test_secure_endpoint_attempts_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let endpoint = websocket_url(&format!("https://{address}")).unwrap();
        assert!(endpoint.starts_with("wss://"));

        let error = open(&endpoint).await.unwrap_err();
        assert!(
            !matches!(
                error,
                tungstenite::Error::Url(tungstenite::error::UrlError::TlsFeatureNotEnabled)
            ),
            "TLS support missing: {error}"
        );

        // The TCP connection was made before the handshake failed
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_checks_in_again_and_flushes_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut first = tokio_tungstenite::accept_async(socket).await.unwrap();
            first.close(None).await.unwrap();
            drop(first);

            let (socket, _) = listener.accept().await.unwrap();
            let mut second = tokio_tungstenite::accept_async(socket).await.unwrap();
            loop {
                match second.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => {}
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        });

        let (transport, mut events) =
            WebSocketTransport::connect(&format!("http://{address}")).unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert_eq!(events.recv().await, Some(TransportEvent::Disconnected));

        // Queued while no connection is up
        transport
            .send(&OutboundMessage::checkin("Rower0002"))
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Connected));

        let received = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&received).unwrap();
        assert_eq!(value["message"], "rower-checkin");
        assert_eq!(value["name"], "Rower0002");
    }
}
