//! Latency probe sample ring.

use std::collections::VecDeque;

/// Samples kept in the ring.
const RING_SIZE: usize = 10;

/// Fixed-size ring of recent probe outcomes.
///
/// `None` is a probe that missed its budget. The advertised latency is
/// the mean of the hits, jitter their standard deviation, and packet
/// loss the miss fraction over the window.
#[derive(Debug, Default)]
pub(crate) struct LatencyRing {
    samples: VecDeque<Option<f64>>,
}

impl LatencyRing {
    /// Records one probe outcome.
    pub fn record(&mut self, latency_ms: Option<f64>) {
        if self.samples.len() == RING_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Mean connect latency over the window, in milliseconds.
    pub fn mean_ms(&self) -> f64 {
        let hits: Vec<f64> = self.samples.iter().flatten().copied().collect();
        if hits.is_empty() {
            return 0.0;
        }
        hits.iter().sum::<f64>() / hits.len() as f64
    }

    /// Standard deviation of the connect latency, in milliseconds.
    pub fn jitter_ms(&self) -> f64 {
        let hits: Vec<f64> = self.samples.iter().flatten().copied().collect();
        if hits.len() < 2 {
            return 0.0;
        }
        let mean = hits.iter().sum::<f64>() / hits.len() as f64;
        let variance = hits.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / hits.len() as f64;
        variance.sqrt()
    }

    /// Fraction of probes that missed their budget, [0, 1].
    pub fn loss(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let misses = self.samples.iter().filter(|s| s.is_none()).count();
        misses as f64 / self.samples.len() as f64
    }
}
