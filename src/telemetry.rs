//! Telemetry utilities for request timing.

use std::time::Instant;

/// Guard for timing a transport request and recording metrics.
///
/// Records request latency when dropped, so early returns are timed too.
pub struct RequestTimer {
    op: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing an operation.
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_request(self.op, duration);
    }
}
