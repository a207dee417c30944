//! Error taxonomy shared across the workspace.

use thiserror::Error;

use crate::jsonrpc::{JsonRpcError, JsonRpcErrorCode};

/// Protocol-level errors that become JSON-RPC error responses.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Malformed JSON or envelope (-32700)
    #[error("Parse error: {0}")]
    Parse(String),
    /// Structurally invalid request (-32600)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Unknown method (-32601)
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The unrecognized method name
        method: String,
    },
    /// Invalid parameters (-32602)
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    /// Internal failure (-32603)
    #[error("Internal error: {0}")]
    Internal(String),
    /// The request was cancelled (-32000)
    #[error("Cancelled")]
    Cancelled,
    /// Domain error in the implementation-defined range
    #[error("{message}")]
    Server {
        /// Code in -32000..=-32099
        code: i32,
        /// Error message
        message: String,
    },
}

impl ProtocolError {
    /// The JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => JsonRpcErrorCode::ParseError.code(),
            Self::InvalidRequest(_) => JsonRpcErrorCode::InvalidRequest.code(),
            Self::MethodNotFound { .. } => JsonRpcErrorCode::MethodNotFound.code(),
            Self::InvalidParams(_) => JsonRpcErrorCode::InvalidParams.code(),
            Self::Internal(_) => JsonRpcErrorCode::InternalError.code(),
            Self::Cancelled => -32000,
            Self::Server { code, .. } => *code,
        }
    }
}

impl From<ProtocolError> for JsonRpcError {
    fn from(err: ProtocolError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

/// Tool execution errors.
///
/// Most of these surface as `{isError: true}` tool results rather than
/// JSON-RPC errors; coercion failures are the exception and map to
/// `-32602`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("The tool '{name}' was not found on the server")]
    UnknownTool {
        /// The requested tool name
        name: String,
    },
    /// An argument had the wrong type
    #[error("Invalid value for parameter '{parameter}': expected type {expected}, got {actual}")]
    InvalidArgumentType {
        /// The parameter name
        parameter: String,
        /// The schema's type name
        expected: String,
        /// What arrived instead
        actual: String,
    },
    /// A required argument was absent
    #[error("Missing required parameter '{parameter}'")]
    MissingRequired {
        /// The parameter name
        parameter: String,
    },
    /// An enum argument matched no case label or raw value
    #[error("Invalid value '{actual}' for parameter '{parameter}': allowed values are {allowed:?}")]
    InvalidEnumValue {
        /// The parameter name
        parameter: String,
        /// Accepted labels
        allowed: Vec<String>,
        /// What arrived instead
        actual: String,
    },
    /// A referenced entity does not exist
    #[error("Not found")]
    NotFound,
    /// The handler needs elicitation but the client lacks the capability
    #[error("The connected client does not support elicitation")]
    ClientHasNoElicitationSupport,
    /// The call was cancelled
    #[error("Cancelled")]
    Cancelled,
    /// The call timed out
    #[error("Timed out")]
    Timeout,
    /// The handler failed
    #[error("{0}")]
    Handler(String),
}

impl ToolError {
    /// Whether this error maps to a JSON-RPC `-32602` response rather
    /// than an `isError` tool result.
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgumentType { .. } | Self::MissingRequired { .. } | Self::InvalidEnumValue { .. }
        )
    }
}

/// Resource lookup and read errors.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// No binding produced the URI
    #[error("Resource not found: {uri}")]
    NotFound {
        /// The requested URI
        uri: String,
    },
    /// The URI matched no declared template
    #[error("No resource template matches {uri}")]
    TemplateMismatch {
        /// The requested URI
        uri: String,
    },
    /// The resource handler failed
    #[error("Resource handler failed: {0}")]
    HandlerFailure(String),
}

/// Token validation errors, tagged per failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// 5-segment tokens are JWE, which is not supported
    #[error("JWE tokens are not supported")]
    JweNotSupported,
    /// Not a 3-segment compact JWS
    #[error("invalid token format")]
    InvalidFormat,
    /// A segment was not valid base64url
    #[error("invalid base64url segment")]
    InvalidBase64,
    /// A decoded segment was not valid JSON
    #[error("invalid JSON in token segment")]
    InvalidJson,
    /// Header algorithm is not RS256
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    /// Header has no key id
    #[error("token header has no kid")]
    MissingKeyId,
    /// No JWKS key matches the header kid
    #[error("no key matches the token kid")]
    KeyNotFound,
    /// Signature verification failed
    #[error("signature verification failed")]
    SignatureFailed,
    /// `exp` is in the past beyond the allowed skew (or missing)
    #[error("token is expired")]
    Expired,
    /// `nbf` is in the future beyond the allowed skew
    #[error("token is not yet valid")]
    NotYetValid,
    /// `iss` does not match the expected issuer
    #[error("issuer mismatch")]
    InvalidIssuer,
    /// `aud` does not contain the expected audience
    #[error("audience mismatch")]
    InvalidAudience,
    /// `azp` does not match the expected authorized party
    #[error("authorized party mismatch")]
    InvalidAuthorizedParty,
    /// JWKS could not be fetched or decoded
    #[error("failed to fetch JWKS")]
    MetadataFetch,
}
