use crate::core::errors::SocketError;
use crate::core::kernel::codec::WsCodec;
use crate::core::types::Request;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_retry::strategy::{jitter, FibonacciBackoff};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, instrument, warn};

/// Transport tuning for connection attempts
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Attempts per connection before giving up until the next send
    pub max_connect_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000, // 10 seconds
            max_connect_attempts: 5,
            reconnect_delay_ms: 1_000, // 1 second
        }
    }
}

impl WsConfig {
    /// Delays between connection attempts: Fibonacci growth from the base
    /// delay, capped at one minute, jittered.
    pub fn retry_delays(&self) -> impl Iterator<Item = Duration> {
        FibonacciBackoff::from_millis(self.reconnect_delay_ms.max(1))
            .max_delay(Duration::from_secs(60))
            .map(jitter)
            .take(self.max_connect_attempts.saturating_sub(1) as usize)
    }
}

/// WebSocket session trait - pure transport layer
#[async_trait]
pub trait WsSession<C: WsCodec>: Send {
    /// Connect to the WebSocket
    async fn connect(&mut self) -> Result<(), SocketError>;

    /// Send a raw message
    async fn send_raw(&mut self, msg: Message) -> Result<(), SocketError>;

    /// Receive the next raw data message; `None` once the peer has closed
    async fn next_raw(&mut self) -> Option<Result<Message, SocketError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;

    /// Check if the connection is alive
    fn is_connected(&self) -> bool;

    /// Encode and send a request frame
    async fn send_message(&mut self, request: &Request) -> Result<(), SocketError>;

    /// Get the next decoded frame
    async fn next_message(&mut self) -> Option<Result<C::Message, SocketError>>;
}

type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Tungstenite-based WebSocket implementation
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    write: Option<WsWrite>,
    read: Option<WsRead>,
    connected: bool,
    codec: C,
    config: WsConfig,
}

impl<C: WsCodec> TungsteniteWs<C> {
    /// Create a new WebSocket session with the specified codec
    pub fn new(url: String, codec: C) -> Self {
        Self {
            url,
            write: None,
            read: None,
            connected: false,
            codec,
            config: WsConfig::default(),
        }
    }

    /// Set custom WebSocket configuration
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), SocketError> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| SocketError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
            .map_err(|e| SocketError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;

        Ok(())
    }

    #[instrument(skip(self, msg), fields(url = %self.url))]
    async fn send_raw(&mut self, msg: Message) -> Result<(), SocketError> {
        if !self.connected {
            return Err(SocketError::NetworkError(
                "WebSocket not connected".to_string(),
            ));
        }

        let write = self.write.as_mut().ok_or_else(|| {
            SocketError::NetworkError("WebSocket write stream not available".to_string())
        })?;

        write.send(msg).await.map_err(|e| {
            self.connected = false;
            SocketError::NetworkError(format!("Failed to send WebSocket message: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn next_raw(&mut self) -> Option<Result<Message, SocketError>> {
        loop {
            if !self.connected {
                return None;
            }

            let read = self.read.as_mut()?;

            match read.next().await {
                Some(Ok(message)) => match message {
                    Message::Close(frame) => {
                        debug!(?frame, "Server closed the connection");
                        self.connected = false;
                        return None;
                    }
                    Message::Ping(data) => {
                        // Auto-respond to pings at transport level
                        if let Err(e) = self.send_raw(Message::Pong(data)).await {
                            warn!("Failed to send pong response: {}", e);
                        }
                    }
                    Message::Pong(_) | Message::Frame(_) => {}
                    _ => return Some(Ok(message)),
                },
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(SocketError::NetworkError(format!(
                        "WebSocket error: {}",
                        e
                    ))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn close(&mut self) -> Result<(), SocketError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_message(&mut self, request: &Request) -> Result<(), SocketError> {
        let message = self.codec.encode_request(request)?;
        self.send_raw(message).await
    }

    async fn next_message(&mut self) -> Option<Result<C::Message, SocketError>> {
        loop {
            let raw_msg = match self.next_raw().await? {
                Ok(raw_msg) => raw_msg,
                Err(e) => return Some(Err(e)),
            };

            match self.codec.decode_message(raw_msg) {
                Ok(Some(decoded)) => return Some(Ok(decoded)),
                Ok(None) => {} // Codec chose to ignore this message
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
