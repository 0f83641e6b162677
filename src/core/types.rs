use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const REQ_ID_KEY: &str = "req_id";

/// Logical type of a command or response, identified on the wire by its key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Authorize,
    Balance,
    GetSettings,
    WebsiteStatus,
    GetAccountStatus,
    GetFinancialAssessment,
    LandingCompany,
    Logout,
    Ping,
    Other(String),
}

impl MessageKind {
    /// Wire key for this kind
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authorize => "authorize",
            Self::Balance => "balance",
            Self::GetSettings => "get_settings",
            Self::WebsiteStatus => "website_status",
            Self::GetAccountStatus => "get_account_status",
            Self::GetFinancialAssessment => "get_financial_assessment",
            Self::LandingCompany => "landing_company",
            Self::Logout => "logout",
            Self::Ping => "ping",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for MessageKind {
    fn from(kind: &str) -> Self {
        match kind {
            "authorize" => Self::Authorize,
            "balance" => Self::Balance,
            "get_settings" => Self::GetSettings,
            "website_status" => Self::WebsiteStatus,
            "get_account_status" => Self::GetAccountStatus,
            "get_financial_assessment" => Self::GetFinancialAssessment,
            "landing_company" => Self::LandingCompany,
            "logout" => Self::Logout,
            "ping" => Self::Ping,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        Self::from(kind.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// An outgoing command frame.
///
/// The body always carries exactly one command key, the one named by
/// [`Request::kind`]. Modifiers such as `subscribe` are extra keys, and the
/// session injects `req_id` when a reply is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    kind: MessageKind,
    body: Map<String, Value>,
}

impl Request {
    pub fn new(kind: MessageKind, value: impl Into<Value>) -> Self {
        let mut body = Map::new();
        body.insert(kind.as_str().to_string(), value.into());
        Self { kind, body }
    }

    /// Add a modifier field alongside the command key.
    ///
    /// The command key and `req_id` are owned by the request itself and the
    /// session; attempts to set them here are ignored.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != self.kind.as_str() && key != REQ_ID_KEY {
            self.body.insert(key.to_string(), value.into());
        }
        self
    }

    /// Mark the request as a stream subscription (`subscribe: 1`)
    pub fn subscribe(self) -> Self {
        self.with("subscribe", 1)
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn req_id(&self) -> Option<u64> {
        self.body.get(REQ_ID_KEY).and_then(Value::as_u64)
    }

    pub(crate) fn set_req_id(&mut self, id: u64) {
        self.body.insert(REQ_ID_KEY.to_string(), Value::from(id));
    }
}

impl Serialize for Request {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.body.serialize(serializer)
    }
}

/// Protocol-level error carried by a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} - {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// An inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub msg_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_req: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    /// The payload stored under the `msg_type` key, if any
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(self.msg_type.as_str())
    }

    /// Look up a string field inside the payload object
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload()
            .and_then(|payload| payload.get(field))
            .and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
