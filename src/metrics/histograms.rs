//! Histogram metrics

use super::labels::REQUEST_DURATION_MS;

/// Record the round-trip time of one request
pub fn request_duration(method: &'static str, ms: u64) {
    metrics::histogram!(REQUEST_DURATION_MS, "method" => method).record(ms as f64);
}
