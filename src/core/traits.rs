use crate::core::types::{MessageKind, Response};

/// Identity storage owned outside the session (cookies in a browser client).
///
/// Keys used by the session are [`TOKEN_KEY`], [`LOGINID_KEY`] and
/// [`RESIDENCE_KEY`].
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);
}

pub const TOKEN_KEY: &str = "token";
pub const LOGINID_KEY: &str = "loginid";
pub const RESIDENCE_KEY: &str = "residence";

/// Backing store for the most recent response of each message kind.
///
/// May be shared process-wide between several sessions.
pub trait ResponseStore: Send + Sync {
    fn get(&self, kind: &MessageKind) -> Option<Response>;

    fn set(&self, kind: &MessageKind, response: Response);
}

/// Callbacks into the application around the session handshake
pub trait SessionHooks: Send + Sync {
    /// A matching `authorize` response was accepted
    fn on_authorized(&self, _response: &Response) {}

    /// The server answered a `logout` request
    fn on_logout(&self, _response: &Response) {}

    /// Every required handshake kind has been satisfied; fires once per session
    fn on_ready(&self) {}
}

/// Hooks that ignore every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}
