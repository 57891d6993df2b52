//! JSON-RPC 2.0 envelopes and the unified error taxonomy.
//!
//! Every transport decodes bytes into a [`Request`] and encodes a
//! [`Response`] back out; the shapes here are the single source of truth
//! for the wire format. Identifiers and params are kept as raw JSON so a
//! response echoes the identifier bytewise and handlers decide how to
//! interpret their arguments.
//!
//! # Error records
//!
//! Errors carry an integer code on the outer `error` object and a
//! structured [`ErrorDetail`] underneath. The detail's `kind` is the
//! stable tag that drives the outer code; the `trace_id` is a fresh
//! 128-bit hex value for correlating logs across components.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Protocol tag required on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// The single MCP protocol version this server speaks.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "1.0";

/// Server name advertised in the initialize response.
pub const SERVER_NAME: &str = "open-sandbox";

/// Server version advertised in the initialize response.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stable error kinds with their wire-visible integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed envelope.
    InvalidRequest,
    /// Unknown method or unknown tool.
    MethodNotFound,
    /// Schema or shape rejected by the handler or dispatcher.
    InvalidParams,
    /// Unexpected failure inside the server.
    Internal,
    /// Authentication missing or invalid.
    Unauthorized,
    /// Permission denied by the handler.
    Forbidden,
    /// Handler-reported domain failure.
    ToolError,
}

impl ErrorKind {
    /// The JSON-RPC integer code for this kind.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::Unauthorized => -32001,
            Self::Forbidden => -32003,
            Self::ToolError => -32010,
        }
    }

    /// The stable kind tag carried in the error detail.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::Internal => "internal",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::ToolError => "tool_error",
        }
    }

    /// The short message on the outer error object.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::Internal => "internal error",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::ToolError => "tool error",
        }
    }

    /// Resolves a detail's kind tag back to a kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "invalid_request" => Some(Self::InvalidRequest),
            "method_not_found" => Some(Self::MethodNotFound),
            "invalid_params" => Some(Self::InvalidParams),
            "internal" => Some(Self::Internal),
            "unauthorized" => Some(Self::Unauthorized),
            "forbidden" => Some(Self::Forbidden),
            "tool_error" => Some(Self::ToolError),
            _ => None,
        }
    }
}

/// A parsed request envelope.
///
/// `id` and `params` are raw JSON: the identifier is echoed bytewise and
/// the params are handed to handlers untouched. An absent or literal-null
/// identifier marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol tag, always `"2.0"` after parsing.
    pub jsonrpc: String,
    /// Request identifier (number, string or explicit null).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,
    /// Method name, non-empty after parsing.
    pub method: String,
    /// Raw parameter bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl Request {
    /// Whether this request is a notification (no response is emitted).
    #[must_use]
    pub fn is_notification(&self) -> bool {
        is_notification(self.id.as_deref())
    }
}

/// True when the identifier is absent or the literal `null`.
#[must_use]
pub fn is_notification(id: Option<&RawValue>) -> bool {
    match id {
        None => true,
        Some(raw) => raw.get().trim() == "null",
    }
}

/// A response envelope carrying exactly one of a result or an error.
///
/// A `None` identifier serialises as `"id":null`, the reply shape for
/// requests whose identifier could not be recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol tag, always `"2.0"`.
    pub jsonrpc: String,
    /// The echoed request identifier.
    #[serde(default)]
    pub id: Option<Box<RawValue>>,
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error record on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Builds a success response echoing `id`.
    #[must_use]
    pub fn success(id: Option<Box<RawValue>>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response for `kind`, echoing `id`.
    ///
    /// The outer code and short message come from the kind; the detail is
    /// carried through with a guaranteed trace identifier.
    #[must_use]
    pub fn failure(id: Option<Box<RawValue>>, kind: ErrorKind, mut detail: ErrorDetail) -> Self {
        if detail.trace_id.is_empty() {
            detail.trace_id = new_trace_id();
        }
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(ResponseError {
                code: kind.code(),
                message: kind.message().to_string(),
                data: Some(detail),
            }),
        }
    }
}

/// The outer error object of a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// JSON-RPC integer code.
    pub code: i64,
    /// Short human message.
    pub message: String,
    /// Structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorDetail>,
}

/// Structured error detail attached to every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable domain code (usually equal to the kind tag).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// 32 lowercase hex characters, empty only if the system RNG failed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    /// Stable kind tag driving the outer integer code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl ErrorDetail {
    /// Creates a detail with an explicit domain code and a fresh trace.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            trace_id: new_trace_id(),
            kind: kind.tag().to_string(),
        }
    }

    /// Creates a detail whose domain code equals the kind tag.
    #[must_use]
    pub fn of(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_code(kind.tag(), message, kind)
    }

    /// Shorthand for an invalid-request detail.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::InvalidRequest, message)
    }

    /// Shorthand for an invalid-params detail.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::InvalidParams, message)
    }

    /// Shorthand for a method-not-found detail.
    #[must_use]
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::MethodNotFound, message)
    }

    /// Shorthand for an internal detail.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::Internal, message)
    }

    /// Shorthand for an unauthorized detail.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::Unauthorized, message)
    }

    /// Shorthand for a tool-error detail.
    #[must_use]
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::ToolError, message)
    }

    /// The kind this detail maps to; unknown tags map to tool errors.
    #[must_use]
    pub fn resolved_kind(&self) -> ErrorKind {
        ErrorKind::from_tag(&self.kind).unwrap_or(ErrorKind::ToolError)
    }
}

/// A parse failure with whatever identifier could be recovered.
///
/// Transports reply with this identifier (null when unrecoverable) so a
/// client can still correlate the failure.
#[derive(Debug)]
pub struct RequestParseError {
    /// Identifier recovered from the malformed envelope, if any.
    pub id: Option<Box<RawValue>>,
    /// Description of the failure.
    pub message: String,
}

impl RequestParseError {
    /// Converts the failure into an invalid-request response.
    #[must_use]
    pub fn into_response(self) -> Response {
        Response::failure(
            self.id,
            ErrorKind::InvalidRequest,
            ErrorDetail::invalid_request(self.message),
        )
    }
}

/// Lenient first-pass shape used to recover the identifier from
/// envelopes that fail strict validation.
#[derive(Deserialize)]
struct LooseEnvelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Box<RawValue>>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Box<RawValue>>,
}

/// Parses a byte buffer into a request envelope.
///
/// # Errors
///
/// Returns [`RequestParseError`] if the JSON is malformed, the protocol
/// tag is not `"2.0"`, or the method is absent or empty. The recovered
/// identifier is carried in the error when the JSON itself parsed.
pub fn parse_request(payload: &[u8]) -> Result<Request, RequestParseError> {
    let Ok(loose) = serde_json::from_slice::<LooseEnvelope>(payload) else {
        return Err(RequestParseError {
            id: None,
            message: "invalid request".to_string(),
        });
    };

    if loose.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        return Err(RequestParseError {
            id: loose.id,
            message: "invalid jsonrpc version".to_string(),
        });
    }
    let Some(method) = loose.method.filter(|m| !m.is_empty()) else {
        return Err(RequestParseError {
            id: loose.id,
            message: "method is required".to_string(),
        });
    };

    Ok(Request {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: loose.id,
        method,
        params: loose.params,
    })
}

/// A rejected protocol-version field.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolVersionError {
    /// The field was present but not a non-empty string.
    Invalid,
    /// The field named a version other than the supported one.
    Unsupported,
}

impl std::fmt::Display for ProtocolVersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid protocol version"),
            Self::Unsupported => write!(f, "unsupported protocol version"),
        }
    }
}

/// Extracts and validates the protocol-version field from params.
///
/// Both `protocolVersion` and `protocol_version` are recognised. An
/// absent field (or params that are not a JSON object) is accepted and
/// yields `None`; a present field must be a non-empty string equal to
/// [`SUPPORTED_PROTOCOL_VERSION`].
///
/// # Errors
///
/// Returns [`ProtocolVersionError`] when the field is present but not a
/// non-empty string, or names an unsupported version.
pub fn requested_protocol_version(
    params: Option<&RawValue>,
) -> Result<Option<String>, ProtocolVersionError> {
    let Some(raw) = params else {
        return Ok(None);
    };
    let Ok(payload) = serde_json::from_str::<Value>(raw.get()) else {
        return Ok(None);
    };
    let Some(object) = payload.as_object() else {
        return Ok(None);
    };
    let Some(field) = object
        .get("protocolVersion")
        .or_else(|| object.get("protocol_version"))
    else {
        return Ok(None);
    };
    let version = field
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ProtocolVersionError::Invalid)?;
    if version != SUPPORTED_PROTOCOL_VERSION {
        return Err(ProtocolVersionError::Unsupported);
    }
    Ok(Some(version.to_string()))
}

/// Generates a fresh 128-bit trace identifier as 32 lowercase hex chars.
///
/// An RNG failure yields an empty trace rather than failing the
/// response.
#[must_use]
pub fn new_trace_id() -> String {
    use rand::rngs::OsRng;
    use rand::TryRngCore;

    let mut buf = [0_u8; 16];
    if OsRng.try_fill_bytes(&mut buf).is_err() {
        return String::new();
    }
    hex::encode(buf)
}
