//! The JSON-RPC message envelopes and the inbound validity contract.
//!
//! The request struct is deliberately lenient on deserialization: `jsonrpc` is
//! defaulted and `method` is optional, so malformed inbound envelopes can still be
//! represented and handed to the dispatcher's observability hooks. Validity is a
//! predicate ([`Request::is_valid`]), not a parse failure.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved notification method used to signal cancellation of an in-flight request.
/// Its params carry the id of the request to cancel: `{"id": <id>}`.
pub const ABORT_REQUEST_METHOD: &str = "rpc_abortRequest";

/// A request id: an opaque string or an integer. Uniqueness within a channel's
/// lifetime is the caller's responsibility.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => n.fmt(f),
            Id::String(s) => s.fmt(f),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_owned())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

/// A request or notification envelope. A present `id` marks a request, which expects
/// exactly one reply; an absent `id` marks a notification, which never gets one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request envelope expecting a reply correlated by `id`.
    pub fn call(id: Id, method: impl Into<String>, params: impl Into<Option<Value>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            method: Some(method.into()),
            params: params.into(),
        }
    }

    /// Build a fire-and-forget notification envelope.
    pub fn notification(method: impl Into<String>, params: impl Into<Option<Value>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: Some(method.into()),
            params: params.into(),
        }
    }

    /// The validity predicate for inbound envelopes: the protocol tag must be exactly
    /// `"2.0"` and a method must be present.
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION && self.method.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The wire error object carried by error responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response envelope: exactly one of `result` or `error`, with the id echoing the
/// originating request (or `null` if it could not be determined).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(ErrorObject),
}

impl Response {
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: Option<Id>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }
}

/// Parse raw text into an envelope. This is the only place textual decoding happens;
/// any failure maps to a ParseError (-32700).
pub fn parse_message(text: &str) -> Result<Request, RpcError> {
    serde_json::from_str(text).map_err(|_| RpcError::parse_error(None))
}
