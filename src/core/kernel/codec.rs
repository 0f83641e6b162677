use crate::core::errors::SocketError;
use crate::core::types::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for converting between session frames and raw WebSocket messages
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed inbound frames
    type Message: Send + Sync;

    /// Encode an outgoing request into a WebSocket message
    fn encode_request(&self, request: &Request) -> Result<Message, SocketError>;

    /// Decode a raw WebSocket message into a typed frame
    ///
    /// Control messages (ping, pong, close) are handled at the transport
    /// level and never reach the codec.
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded frame
    /// - `Ok(None)` - Message was ignored by the codec
    /// - `Err(SocketError::MalformedFrame)` - Text that is not a valid frame
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, SocketError>;
}

/// JSON text-frame codec
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl WsCodec for JsonCodec {
    type Message = Response;

    fn encode_request(&self, request: &Request) -> Result<Message, SocketError> {
        let json_str = serde_json::to_string(request)?;
        Ok(Message::Text(json_str))
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, SocketError> {
        match message {
            Message::Text(text) => serde_json::from_str::<Response>(&text)
                .map(Some)
                .map_err(|e| SocketError::MalformedFrame(format!("{}: {}", e, text))),
            // The protocol is text-only
            _ => Ok(None),
        }
    }
}
