//! Counter metrics

use super::labels::*;

/// Record a handshake outcome
pub fn handshake(outcome: &'static str) {
    metrics::counter!(HANDSHAKE_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an authentication outcome
pub fn auth(outcome: &'static str) {
    metrics::counter!(AUTH_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a reopen outcome
pub fn reopen(outcome: &'static str) {
    metrics::counter!(REOPEN_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a failed request
pub fn request_error(method: &'static str, kind: &'static str) {
    metrics::counter!(REQUEST_ERRORS_TOTAL, "method" => method, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::CapturingRecorder;

    #[test]
    fn test_counters_without_recorder() {
        handshake(OUTCOME_SUCCESS);
        auth(OUTCOME_REJECTED);
        reopen(OUTCOME_ERROR);
        request_error("authenticate", "timeout");
    }

    #[test]
    fn test_counters_by_label() {
        let recorder = CapturingRecorder::default();
        metrics::with_local_recorder(&recorder, || {
            handshake(OUTCOME_SUCCESS);
            handshake(OUTCOME_SUCCESS);
            handshake(OUTCOME_REJECTED);
            request_error("executeWithParameter", "timeout");
        });

        assert_eq!(recorder.counter(HANDSHAKE_TOTAL, &[("outcome", OUTCOME_SUCCESS)]), 2);
        assert_eq!(recorder.counter(HANDSHAKE_TOTAL, &[("outcome", OUTCOME_REJECTED)]), 1);
        assert_eq!(recorder.counter(HANDSHAKE_TOTAL, &[("outcome", OUTCOME_ERROR)]), 0);
        assert_eq!(
            recorder.counter(
                REQUEST_ERRORS_TOTAL,
                &[("method", "executeWithParameter"), ("kind", "timeout")]
            ),
            1
        );
    }
}
