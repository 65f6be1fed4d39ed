//! Error types

use crate::protocol::{ApplicationErrorKind, ErrorCode};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by a graph connection
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport could not be constructed
    #[error("failed to create transport: {0}")]
    TransportConstruction(#[source] Box<Error>),

    /// Transport was constructed but could not be opened
    #[error("failed to open transport: {0}")]
    TransportOpen(#[source] Box<Error>),

    /// Transport-level failure (HTTP status, HTTP/2 stream error, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// A request exceeded the configured transport timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Peer closed the transport
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation not valid in the current connection state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The version verification RPC itself failed; the connection was closed
    #[error("failed to verify client handshake key: {0}")]
    Handshake(#[source] Box<Error>),

    /// The server rejected the client's handshake key
    #[error("incompatible handshake key between client and server: {message}")]
    HandshakeRejected {
        /// Error code reported by the server
        code: ErrorCode,
        /// Error message reported by the server
        message: String,
    },

    /// The authenticate RPC failed; the transport was closed
    #[error("authentication failed: {source}{}", close_failure(.close_error))]
    Authentication {
        /// Original RPC failure
        source: Box<Error>,
        /// Failure while closing the transport afterwards, if any
        close_error: Option<Box<Error>>,
    },

    /// Reopening the transport after a timeout failed
    #[error("failed to reopen connection: {0}")]
    Reopen(#[source] Box<Error>),

    /// Server answered with a thrift application exception
    #[error("server exception ({kind}): {message}")]
    Application {
        /// Exception kind
        kind: ApplicationErrorKind,
        /// Exception message
        message: String,
    },

    /// Reply carried a different sequence id than the request
    #[error("out of order response: expected seq {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence id of the request
        expected: i32,
        /// Sequence id found in the reply
        actual: i32,
    },

    /// Malformed or unexpected wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Structured payload could not be deserialized
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn close_failure(close_error: &Option<Box<Error>>) -> String {
    match close_error {
        Some(e) => format!(" (additionally failed to close transport: {})", e),
        None => String::new(),
    }
}

impl Error {
    /// Whether this error belongs to the transport-timeout class
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Short category label, used for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::TransportConstruction(_) => "transport_construction",
            Error::TransportOpen(_) => "transport_open",
            Error::Transport(_) => "transport",
            Error::Timeout(_) => "timeout",
            Error::ConnectionClosed => "connection_closed",
            Error::InvalidState { .. } => "invalid_state",
            Error::Handshake(_) => "handshake",
            Error::HandshakeRejected { .. } => "handshake_rejected",
            Error::Authentication { .. } => "authentication",
            Error::Reopen(_) => "reopen",
            Error::Application { .. } => "application",
            Error::SequenceMismatch { .. } => "sequence_mismatch",
            Error::Protocol(_) => "protocol",
            Error::Json(_) => "json",
        }
    }
}
