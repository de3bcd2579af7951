//! Throughput estimation for the aggregate snapshot.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window throughput meter.
///
/// Chunk completions feed byte samples in; the snapshot reads an averaged
/// bytes-per-second figure. Samples outside the window are pruned on every
/// insert, and the sample count is bounded so a chunk storm cannot grow the
/// buffer without limit.
pub(crate) struct SpeedMeter {
    inner: Mutex<MeterInner>,
}

struct MeterInner {
    samples: Vec<(Instant, u64)>,
    window: Duration,
    max_samples: usize,
}

impl SpeedMeter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                samples: Vec::new(),
                window: Duration::from_secs(5),
                max_samples: 100,
            }),
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub(crate) fn add_sample(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.samples.push((now, bytes));

        let cutoff = now - inner.window;
        inner.samples.retain(|(at, _)| *at >= cutoff);

        if inner.samples.len() > inner.max_samples {
            let excess = inner.samples.len() - inner.max_samples;
            inner.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second over the window; 0.0 with fewer than
    /// two samples.
    pub(crate) fn bytes_per_second(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.samples.len() < 2 {
            return 0.0;
        }
        let (first, _) = inner.samples[0];
        let (last, _) = inner.samples[inner.samples.len() - 1];
        let elapsed = last.duration_since(first);
        if elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = inner.samples.iter().map(|(_, b)| *b).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Clears all samples (the ongoing set drained).
    pub(crate) fn reset(&self) {
        self.inner.lock().unwrap().samples.clear();
    }
}
