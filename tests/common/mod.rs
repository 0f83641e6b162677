#![allow(dead_code)]

use async_trait::async_trait;
use champion_socket::core::kernel::{JsonCodec, WsCodec, WsSession};
use champion_socket::{Request, Response, SocketError};
use serde_json::{json, Value};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Test configuration utilities
pub struct TestConfig;

impl TestConfig {
    /// Check if live server tests should run
    pub fn should_run_live_tests() -> bool {
        env::var("RUN_LIVE_TESTS").unwrap_or_default() == "true"
    }

    /// Get test timeout duration
    pub fn test_timeout_seconds() -> u64 {
        env::var("TEST_TIMEOUT_SECONDS")
            .unwrap_or_default()
            .parse()
            .unwrap_or(30)
    }
}

pub fn short_timeout() -> Duration {
    Duration::from_secs(2)
}

/// In-process transport handed to the connection task.
///
/// Each successful `connect` announces a [`MockConnection`] to the
/// [`MockServer`], which the test then drives.
pub struct MockTransport {
    url: String,
    codec: JsonCodec,
    announce: mpsc::UnboundedSender<MockConnection>,
    attempts: Arc<AtomicUsize>,
    failures: usize,
    outgoing: Option<mpsc::UnboundedSender<Value>>,
    inbound: Option<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl WsSession<JsonCodec> for MockTransport {
    async fn connect(&mut self) -> Result<(), SocketError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(SocketError::NetworkError("connection refused".to_string()));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.outgoing = Some(outgoing_tx);
        self.inbound = Some(inbound_rx);

        self.announce
            .send(MockConnection {
                url: self.url.clone(),
                sent: outgoing_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| SocketError::NetworkError("mock server gone".to_string()))
    }

    async fn send_raw(&mut self, msg: Message) -> Result<(), SocketError> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| SocketError::NetworkError("not connected".to_string()))?;

        let Message::Text(text) = msg else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(&text)?;
        outgoing
            .send(value)
            .map_err(|_| SocketError::NetworkError("peer closed".to_string()))
    }

    async fn next_raw(&mut self) -> Option<Result<Message, SocketError>> {
        let inbound = self.inbound.as_mut()?;
        inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.outgoing = None;
        self.inbound = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.outgoing.is_some()
    }

    async fn send_message(&mut self, request: &Request) -> Result<(), SocketError> {
        let msg = self.codec.encode_request(request)?;
        self.send_raw(msg).await
    }

    async fn next_message(&mut self) -> Option<Result<Response, SocketError>> {
        loop {
            let raw = match self.next_raw().await? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            match self.codec.decode_message(raw) {
                Ok(Some(response)) => return Some(Ok(response)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Test side of the mock transport
pub struct MockServer {
    connections: mpsc::UnboundedReceiver<MockConnection>,
    attempts: Arc<AtomicUsize>,
}

impl MockServer {
    /// Factory plus server; the first `failures` connect attempts are refused
    pub fn new(failures: usize) -> (impl FnMut(&str) -> MockTransport + Send + 'static, Self) {
        let (announce, connections) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let factory_attempts = Arc::clone(&attempts);

        let factory = move |url: &str| MockTransport {
            url: url.to_string(),
            codec: JsonCodec,
            announce: announce.clone(),
            attempts: Arc::clone(&factory_attempts),
            failures,
            outgoing: None,
            inbound: None,
        };

        (
            factory,
            Self {
                connections,
                attempts,
            },
        )
    }

    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> MockConnection {
        tokio::time::timeout(short_timeout(), self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("factory dropped")
    }

    pub fn try_accept(&mut self) -> Option<MockConnection> {
        self.connections.try_recv().ok()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// One accepted connection: frames the client wrote, and a way to answer
pub struct MockConnection {
    pub url: String,
    sent: mpsc::UnboundedReceiver<Value>,
    inbound: mpsc::UnboundedSender<Message>,
}

impl MockConnection {
    /// Next frame written by the client
    pub async fn next_sent(&mut self) -> Value {
        tokio::time::timeout(short_timeout(), self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection")
    }

    pub fn try_next_sent(&mut self) -> Option<Value> {
        self.sent.try_recv().ok()
    }

    /// Push a raw text frame to the client
    pub fn push_text(&self, text: &str) {
        let _ = self.inbound.send(Message::Text(text.to_string()));
    }

    pub fn push(&self, frame: Value) {
        self.push_text(&frame.to_string());
    }

    /// Answer `request` with `payload` under its command key
    pub fn reply(&self, request: &Value, kind: &str, payload: Value) {
        let mut frame = json!({
            "msg_type": kind,
            "echo_req": request,
        });
        frame[kind] = payload;
        if let Some(req_id) = request.get("req_id") {
            frame["req_id"] = req_id.clone();
        }
        self.push(frame);
    }

    /// Answer `request` with a protocol error
    pub fn reply_error(&self, request: &Value, kind: &str, code: &str, message: &str) {
        let mut frame = json!({
            "msg_type": kind,
            "echo_req": request,
            "error": { "code": code, "message": message },
        });
        if let Some(req_id) = request.get("req_id") {
            frame["req_id"] = req_id.clone();
        }
        self.push(frame);
    }

    /// Drive the authorized handshake to completion.
    ///
    /// Expects the `authorize` and `website_status` frames sent on open, then
    /// the `balance` and `get_settings` follow-ups.
    pub async fn complete_handshake(&mut self, loginid: &str) {
        let authorize = self.next_sent().await;
        assert!(authorize.get("authorize").is_some(), "got {}", authorize);
        let status = self.next_sent().await;
        assert!(status.get("website_status").is_some(), "got {}", status);

        self.reply(&authorize, "authorize", json!({ "loginid": loginid }));
        self.reply(&status, "website_status", json!({ "site_status": "up" }));

        let balance = self.next_sent().await;
        assert_eq!(balance["subscribe"], 1, "got {}", balance);
        let settings = self.next_sent().await;
        assert!(settings.get("get_settings").is_some(), "got {}", settings);

        self.reply(&balance, "balance", json!({ "balance": 10, "currency": "USD" }));
        self.reply(&settings, "get_settings", json!({ "country_code": "" }));
    }

    /// Simulate the server dropping the connection
    pub fn close(self) {
        drop(self);
    }
}
