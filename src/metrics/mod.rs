//! Metrics for graph connections
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! application installs a recorder; without one every call is a no-op.
//!
//! * `nebula_wire_handshake_total{outcome}`
//! * `nebula_wire_auth_total{outcome}`
//! * `nebula_wire_reopen_total{outcome}`
//! * `nebula_wire_request_errors_total{method, kind}`
//! * `nebula_wire_request_duration_ms{method}`

pub mod counters;
pub mod histograms;
pub mod labels;

#[cfg(test)]
pub(crate) mod testing;
