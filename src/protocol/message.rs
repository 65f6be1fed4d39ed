//! Protocol message types

use super::constants::method;
use super::value::{DataSet, ParameterMap};
use bytes::Bytes;

/// Graph service request (client → server)
#[derive(Debug, Clone)]
pub enum GraphRequest<'a> {
    /// Client version verification
    VerifyClientVersion(VerifyClientVersionReq),

    /// Session authentication
    Authenticate {
        /// Username bytes
        username: &'a [u8],
        /// Password bytes
        password: &'a [u8],
    },

    /// Session release (oneway)
    Signout {
        /// Session to release
        session_id: i64,
    },

    /// Statement execution with parameters
    ExecuteWithParameter {
        /// Session id
        session_id: i64,
        /// Statement bytes
        stmt: &'a [u8],
        /// Named parameters
        params: &'a ParameterMap,
    },

    /// Statement execution bounded by a server-side timeout
    ExecuteWithTimeout {
        /// Session id
        session_id: i64,
        /// Statement bytes
        stmt: &'a [u8],
        /// Named parameters
        params: &'a ParameterMap,
        /// Server-side execution bound in milliseconds
        timeout_ms: i64,
    },

    /// Statement execution returning a JSON document
    ExecuteJsonWithParameter {
        /// Session id
        session_id: i64,
        /// Statement bytes
        stmt: &'a [u8],
        /// Named parameters
        params: &'a ParameterMap,
    },
}

impl GraphRequest<'_> {
    /// Wire method name
    pub fn method(&self) -> &'static str {
        match self {
            Self::VerifyClientVersion(_) => method::VERIFY_CLIENT_VERSION,
            Self::Authenticate { .. } => method::AUTHENTICATE,
            Self::Signout { .. } => method::SIGNOUT,
            Self::ExecuteWithParameter { .. } => method::EXECUTE_WITH_PARAMETER,
            Self::ExecuteWithTimeout { .. } => method::EXECUTE_WITH_TIMEOUT,
            Self::ExecuteJsonWithParameter { .. } => method::EXECUTE_JSON_WITH_PARAMETER,
        }
    }

    /// Whether the server sends no reply
    pub fn is_oneway(&self) -> bool {
        matches!(self, Self::Signout { .. })
    }
}

/// Client version verification request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyClientVersionReq {
    /// Handshake key (empty when none is configured)
    pub version: Bytes,
}

/// Client version verification response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyClientVersionResp {
    /// Server verdict
    pub error_code: ErrorCode,
    /// Server explanation when the verdict is not `SUCCEEDED`
    pub error_msg: Option<Bytes>,
}

/// Authentication response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse {
    /// Server verdict
    pub error_code: ErrorCode,
    /// Server explanation
    pub error_msg: Option<Bytes>,
    /// Session id issued on success
    pub session_id: Option<i64>,
    /// Server time zone offset
    pub time_zone_offset_seconds: Option<i32>,
    /// Server time zone name
    pub time_zone_name: Option<Bytes>,
}

/// Statement execution response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResponse {
    /// Server verdict
    pub error_code: ErrorCode,
    /// Server-side latency
    pub latency_in_us: i64,
    /// Result set
    pub data: Option<DataSet>,
    /// Current graph space
    pub space_name: Option<Bytes>,
    /// Server explanation
    pub error_msg: Option<Bytes>,
    /// Execution plan description, raw thrift bytes
    pub plan_desc: Option<Bytes>,
    /// Server comment
    pub comment: Option<Bytes>,
}

/// Decoded reply envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// The call's declared result
    Success(T),
    /// The server raised an application exception
    Exception {
        /// Exception kind
        kind: ApplicationErrorKind,
        /// Exception message
        message: String,
    },
}

/// Reply body as produced by a graph server
#[derive(Debug, Clone, Copy)]
pub enum ServerReply<'a> {
    /// Reply to `verifyClientVersion`
    VerifyClientVersion(&'a VerifyClientVersionResp),
    /// Reply to `authenticate`
    Authenticate(&'a AuthResponse),
    /// Reply to `executeWithParameter` / `executeWithTimeout`
    Execution(&'a ExecutionResponse),
    /// Reply to `executeJsonWithParameter`
    Json(&'a [u8]),
}

/// Graph service error code
///
/// Unknown codes are preserved as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

#[allow(missing_docs)]
impl ErrorCode {
    pub const SUCCEEDED: ErrorCode = ErrorCode(0);
    pub const E_DISCONNECTED: ErrorCode = ErrorCode(-1);
    pub const E_FAIL_TO_CONNECT: ErrorCode = ErrorCode(-2);
    pub const E_RPC_FAILURE: ErrorCode = ErrorCode(-3);
    pub const E_BAD_USERNAME_PASSWORD: ErrorCode = ErrorCode(-1001);
    pub const E_SESSION_INVALID: ErrorCode = ErrorCode(-1002);
    pub const E_SESSION_TIMEOUT: ErrorCode = ErrorCode(-1003);
    pub const E_SYNTAX_ERROR: ErrorCode = ErrorCode(-1004);
    pub const E_EXECUTION_ERROR: ErrorCode = ErrorCode(-1005);
    pub const E_STATEMENT_EMPTY: ErrorCode = ErrorCode(-1006);
    pub const E_BAD_PERMISSION: ErrorCode = ErrorCode(-1008);
    pub const E_SEMANTIC_ERROR: ErrorCode = ErrorCode(-1009);
    pub const E_TOO_MANY_CONNECTIONS: ErrorCode = ErrorCode(-1010);
    pub const E_PARTIAL_SUCCEEDED: ErrorCode = ErrorCode(-1011);
}

impl ErrorCode {
    /// Whether this is `SUCCEEDED`
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCEEDED
    }

    fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::SUCCEEDED => "SUCCEEDED",
            Self::E_DISCONNECTED => "E_DISCONNECTED",
            Self::E_FAIL_TO_CONNECT => "E_FAIL_TO_CONNECT",
            Self::E_RPC_FAILURE => "E_RPC_FAILURE",
            Self::E_BAD_USERNAME_PASSWORD => "E_BAD_USERNAME_PASSWORD",
            Self::E_SESSION_INVALID => "E_SESSION_INVALID",
            Self::E_SESSION_TIMEOUT => "E_SESSION_TIMEOUT",
            Self::E_SYNTAX_ERROR => "E_SYNTAX_ERROR",
            Self::E_EXECUTION_ERROR => "E_EXECUTION_ERROR",
            Self::E_STATEMENT_EMPTY => "E_STATEMENT_EMPTY",
            Self::E_BAD_PERMISSION => "E_BAD_PERMISSION",
            Self::E_SEMANTIC_ERROR => "E_SEMANTIC_ERROR",
            Self::E_TOO_MANY_CONNECTIONS => "E_TOO_MANY_CONNECTIONS",
            Self::E_PARTIAL_SUCCEEDED => "E_PARTIAL_SUCCEEDED",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "error code {}", self.0),
        }
    }
}

/// Thrift application exception kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationErrorKind {
    /// Unspecified
    Unknown,
    /// Server does not implement the method
    UnknownMethod,
    /// Message type not understood
    InvalidMessageType,
    /// Reply named a different method
    WrongMethodName,
    /// Reply carried an unexpected sequence id
    BadSequenceId,
    /// Reply carried no result
    MissingResult,
    /// Server-side failure
    InternalError,
    /// Malformed request
    ProtocolError,
    /// Any other kind, by numeric id
    Other(i32),
}

impl From<i32> for ApplicationErrorKind {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            other => Self::Other(other),
        }
    }
}

impl std::fmt::Display for ApplicationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::UnknownMethod => write!(f, "unknown_method"),
            Self::InvalidMessageType => write!(f, "invalid_message_type"),
            Self::WrongMethodName => write!(f, "wrong_method_name"),
            Self::BadSequenceId => write!(f, "bad_sequence_id"),
            Self::MissingResult => write!(f, "missing_result"),
            Self::InternalError => write!(f, "internal_error"),
            Self::ProtocolError => write!(f, "protocol_error"),
            Self::Other(id) => write!(f, "kind_{}", id),
        }
    }
}
