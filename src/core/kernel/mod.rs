/// Transport kernel - the WebSocket message channel under the session layer
///
/// The kernel knows how to open a connection, move raw frames, and turn them
/// into typed [`Request`](crate::core::types::Request) /
/// [`Response`](crate::core::types::Response) values. It holds no session
/// state: correlation, readiness and buffering live in [`crate::socket`].
///
/// ## Transport Layer
/// - `WsSession`: WebSocket connection trait, implemented by `TungsteniteWs`
///   and by in-process doubles in tests
/// - `WsConfig`: connect timeout and retry schedule
///
/// ## Message Handling
/// - `WsCodec`: frame encoding/decoding, implemented by `JsonCodec`
///
/// ```rust,no_run
/// use champion_socket::core::kernel::*;
/// use champion_socket::core::types::{MessageKind, Request};
///
/// # async fn example() -> Result<(), champion_socket::SocketError> {
/// let mut ws = TungsteniteWs::new(
///     "wss://ws.binaryws.com/websockets/v3?app_id=2472".to_string(),
///     JsonCodec,
/// );
/// ws.connect().await?;
/// ws.send_message(&Request::new(MessageKind::WebsiteStatus, 1)).await?;
/// if let Some(Ok(response)) = ws.next_message().await {
///     println!("{}", response.msg_type);
/// }
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod ws;

pub use codec::{JsonCodec, WsCodec};
pub use ws::{TungsteniteWs, WsConfig, WsSession};
