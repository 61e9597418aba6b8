//! Bandwidth estimation from probe samples.

use std::time::Duration;

use marquee_core::ConnectionEstimate;

/// One timed download.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeSample {
    /// Body bytes received.
    pub bytes: u64,
    /// Wall time from request to last byte.
    pub duration: Duration,
    /// Time to response headers.
    pub latency: Duration,
}

/// Smooths probe samples into a [`ConnectionEstimate`].
///
/// Speed uses two exponentially weighted averages (fast and slow half-life,
/// weighted by transfer seconds) and reports the lower of the two, so a
/// single lucky burst does not inflate the estimate. Latency is averaged
/// per sample.
#[derive(Clone, Debug)]
pub struct ConnectionEstimator {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
    latency_ewma: Ewma,
    bytes_sampled: u64,
    samples: u64,
}

impl Default for ConnectionEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    const LATENCY_HALF_LIFE_SAMPLES: f64 = 3.0;
    const MIN_PROBE_BYTES: u64 = 16_000;
    const MIN_DURATION_MS: f64 = 0.5;

    pub fn new() -> Self {
        Self {
            fast_ewma: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow_ewma: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
            latency_ewma: Ewma::new(Self::LATENCY_HALF_LIFE_SAMPLES),
            bytes_sampled: 0,
            samples: 0,
        }
    }

    pub fn push_sample(&mut self, sample: ProbeSample) {
        self.latency_ewma
            .add_sample(1.0, sample.latency.as_secs_f64() * 1000.0);
        self.samples += 1;

        // Too small to say anything about throughput.
        if sample.bytes < Self::MIN_PROBE_BYTES {
            return;
        }

        let dur_ms = (sample.duration.as_secs_f64() * 1000.0).max(Self::MIN_DURATION_MS);
        let mbps = (sample.bytes as f64) * 8.0 / 1000.0 / dur_ms;
        let weight_secs = dur_ms / 1000.0;

        self.fast_ewma.add_sample(weight_secs, mbps);
        self.slow_ewma.add_sample(weight_secs, mbps);
        self.bytes_sampled = self.bytes_sampled.saturating_add(sample.bytes);
    }

    pub fn speed_mbps(&self) -> Option<f64> {
        let est = self
            .fast_ewma
            .get_estimate()
            .min(self.slow_ewma.get_estimate());
        (est > 0.0).then_some(est)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.latency_ewma.get_estimate())
    }

    /// Current estimate, once at least one throughput sample is in.
    pub fn estimate(&self) -> Option<ConnectionEstimate> {
        let speed = self.speed_mbps()?;
        Some(ConnectionEstimate::new(speed, self.latency_ms().unwrap_or(0.0)))
    }

    pub fn bytes_sampled(&self) -> u64 {
        self.bytes_sampled
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        self.last_estimate = val * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight.max(0.0);
    }

    fn get_estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
            self.last_estimate / zero_factor.max(1e-6)
        }
    }
}
