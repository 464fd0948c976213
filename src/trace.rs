//! TraceAccumulator: an optional diagnostic that sums the reciprocal
//! lengths of monotone source-run segments seen during k-way and in-memory
//! merges, plus a segment count. Purely informational; it has no effect
//! on sort output, and is safe to update from multiple rayon worker
//! threads concurrently via a compare-and-swap loop on the `f64` sum and
//! an atomic add on the count.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-scoped (per top-level sort invocation) Φ accumulator.
#[derive(Debug, Default)]
pub struct Trace {
    phi_bits: AtomicU64,
    segment_count: AtomicI64,
}

/// A snapshot of the accumulated diagnostic, returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceReport {
    pub phi_sum: f64,
    pub segment_count: i64,
}

impl Trace {
    pub fn new() -> Self {
        Trace {
            phi_bits: AtomicU64::new(0.0f64.to_bits()),
            segment_count: AtomicI64::new(0),
        }
    }

    /// Record one monotone merge segment of length `len` (`len >= 1`).
    pub fn record_segment(&self, len: usize) {
        debug_assert!(len > 0);
        let delta = 1.0 / (len as f64);
        let mut current = self.phi_bits.load(Ordering::Relaxed);
        loop {
            let sum = f64::from_bits(current) + delta;
            match self.phi_bits.compare_exchange_weak(
                current,
                sum.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.segment_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.phi_bits.store(0.0f64.to_bits(), Ordering::Relaxed);
        self.segment_count.store(0, Ordering::Relaxed);
    }

    pub fn report(&self) -> TraceReport {
        TraceReport {
            phi_sum: f64::from_bits(self.phi_bits.load(Ordering::Relaxed)),
            segment_count: self.segment_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_reciprocal_lengths() {
        let trace = Trace::new();
        trace.record_segment(1);
        trace.record_segment(2);
        trace.record_segment(4);
        let report = trace.report();
        assert!((report.phi_sum - (1.0 + 0.5 + 0.25)).abs() < 1e-12);
        assert_eq!(report.segment_count, 3);
    }

    #[test]
    fn reset_clears_state() {
        let trace = Trace::new();
        trace.record_segment(1);
        trace.reset();
        let report = trace.report();
        assert_eq!(report.phi_sum, 0.0);
        assert_eq!(report.segment_count, 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        use std::sync::Arc;
        let trace = Arc::new(Trace::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let trace = Arc::clone(&trace);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        trace.record_segment(1);
                    }
                });
            }
        });
        assert_eq!(trace.report().segment_count, 8000);
        assert!((trace.report().phi_sum - 8000.0).abs() < 1e-6);
    }
}
