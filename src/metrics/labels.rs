//! Metric names and label values

/// Handshake attempts by outcome
pub const HANDSHAKE_TOTAL: &str = "nebula_wire_handshake_total";

/// Authentication attempts by outcome
pub const AUTH_TOTAL: &str = "nebula_wire_auth_total";

/// Timeout-triggered reopens by outcome
pub const REOPEN_TOTAL: &str = "nebula_wire_reopen_total";

/// Failed requests by method and error category
pub const REQUEST_ERRORS_TOTAL: &str = "nebula_wire_request_errors_total";

/// Request round-trip time in milliseconds
pub const REQUEST_DURATION_MS: &str = "nebula_wire_request_duration_ms";

/// Outcome label values
pub const OUTCOME_SUCCESS: &str = "success";
/// Server answered with a non-success code
pub const OUTCOME_REJECTED: &str = "rejected";
/// The RPC itself failed
pub const OUTCOME_ERROR: &str = "error";
