//! JSON-RPC error codes, canonical messages, and the typed wire error.
//!
//! The JSON-RPC 2.0 spec partitions the code space into five reserved protocol codes,
//! a reserved "server error" band (-32000..=-32099), and everything else, which is
//! free for applications to use.

use crate::message::ErrorObject;
use serde_json::Value;

/// The five error codes reserved by the JSON-RPC 2.0 spec for protocol-level failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

/// Default code reported for handler failures that don't carry a code of their own.
pub const SERVER_ERROR_CODE: i64 = -32000;

/// True iff `code` falls in the reserved server-error band.
pub fn is_server_error(code: i64) -> bool {
    (-32099..=-32000).contains(&code)
}

/// The canonical message for an error code: the spec-defined text for the five
/// reserved protocol codes, `"Server error"` for the server-error band, and
/// `"Application error"` for everything else.
pub fn message_for_code(code: i64) -> &'static str {
    match code {
        -32700 => ErrorCode::ParseError.message(),
        -32600 => ErrorCode::InvalidRequest.message(),
        -32601 => ErrorCode::MethodNotFound.message(),
        -32602 => ErrorCode::InvalidParams.message(),
        -32603 => ErrorCode::InternalError.message(),
        code if is_server_error(code) => "Server error",
        _ => "Application error",
    }
}

/// A typed JSON-RPC error, round-trippable to and from the wire error object.
///
/// Handlers raise these deliberately to control the exact `code`/`message`/`data`
/// reported to the caller; the client reconstructs them from error responses.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    /// Create a typed error. When `message` is omitted it defaults to the canonical
    /// message for `code`.
    pub fn new(
        code: i64,
        message: impl Into<Option<String>>,
        data: impl Into<Option<Value>>,
    ) -> Self {
        Self {
            code,
            message: message
                .into()
                .unwrap_or_else(|| message_for_code(code).to_owned()),
            data: data.into(),
        }
    }

    fn reserved(code: ErrorCode, data: impl Into<Option<Value>>) -> Self {
        Self::new(code.code(), None, data)
    }

    pub fn parse_error(data: impl Into<Option<Value>>) -> Self {
        Self::reserved(ErrorCode::ParseError, data)
    }

    pub fn invalid_request(data: impl Into<Option<Value>>) -> Self {
        Self::reserved(ErrorCode::InvalidRequest, data)
    }

    pub fn method_not_found(data: impl Into<Option<Value>>) -> Self {
        Self::reserved(ErrorCode::MethodNotFound, data)
    }

    pub fn invalid_params(data: impl Into<Option<Value>>) -> Self {
        Self::reserved(ErrorCode::InvalidParams, data)
    }

    pub fn internal_error(data: impl Into<Option<Value>>) -> Self {
        Self::reserved(ErrorCode::InternalError, data)
    }

    /// Serialize into the wire error object. Exact inverse of [`Self::from_object`].
    pub fn to_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code,
            message: Some(self.message.clone()),
            data: self.data.clone(),
        }
    }

    /// Reconstruct from a wire error object, defaulting the message when absent.
    pub fn from_object(object: ErrorObject) -> Self {
        Self {
            code: object.code,
            message: object
                .message
                .unwrap_or_else(|| message_for_code(object.code).to_owned()),
            data: object.data,
        }
    }
}
