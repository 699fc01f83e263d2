//! In-memory request latency histogram.
//! The logging middleware records, /stats/latency reads.

use std::sync::Mutex;
use std::time::Duration;

/// Shared latency stats. Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1us to 100s at 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let us = elapsed.as_micros().min(u128::from(u64::MAX)) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    /// Return (p50_ms, p95_ms, p99_ms). None until a sample arrives.
    pub fn percentiles_ms(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        let to_ms = |us: u64| us as f64 / 1000.0;
        (
            Some(to_ms(h.value_at_quantile(0.5))),
            Some(to_ms(h.value_at_quantile(0.95))),
            Some(to_ms(h.value_at_quantile(0.99))),
        )
    }

    /// Sample count.
    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
