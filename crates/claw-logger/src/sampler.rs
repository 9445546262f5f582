//! Volume reduction by dropping otherwise-accepted records.
//!
//! [`LogSampler`] keeps all of its state in atomics, so `should_sample`
//! never takes a lock and can be called from any number of threads.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

/// How a sampler decides which records to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Keep everything.
    #[default]
    None,
    /// Keep one record in every `floor(1 / rate)`.
    Uniform,
    /// Keep with probability `rate` scaled down by the current load.
    Adaptive,
    /// Keep at most `floor(rate * 10)` records per second.
    Burst,
}

impl SamplingStrategy {
    /// Returns the lowercase name of the strategy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uniform => "uniform",
            Self::Adaptive => "adaptive",
            Self::Burst => "burst",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Uniform => 1,
            Self::Adaptive => 2,
            Self::Burst => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Uniform,
            2 => Self::Adaptive,
            3 => Self::Burst,
            _ => Self::None,
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingStrategy {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "uniform" => Ok(Self::Uniform),
            "adaptive" => Ok(Self::Adaptive),
            "burst" => Ok(Self::Burst),
            other => Err(LoggerError::invalid_config(format!(
                "unknown sampling strategy: {other}"
            ))),
        }
    }
}

/// The sampling capability a logger depends on.
pub trait Sampler: Send + Sync {
    /// Decides whether the next record is kept.
    fn should_sample(&self) -> bool;

    /// Number of records rejected since the last reset.
    fn dropped_count(&self) -> u64;

    /// The effective sampling rate.
    fn current_rate(&self) -> f64;

    /// Replaces the strategy and rate. The rate is clamped to `[0, 1]`.
    fn set_strategy(&self, strategy: SamplingStrategy, rate: f64);

    /// Returns the configured strategy.
    fn strategy(&self) -> SamplingStrategy;

    /// Zeroes the call counter and the dropped count.
    fn reset_stats(&self);
}

/// Upper bound (exclusive) of the synthetic load estimate.
const MAX_SYNTHETIC_LOAD: f64 = 0.5;

/// Length of a burst window in milliseconds.
const BURST_WINDOW_MS: u64 = 1000;

/// Lock-free [`Sampler`] implementing every [`SamplingStrategy`].
pub struct LogSampler {
    strategy: AtomicU8,
    rate_bits: AtomicU64,
    counter: AtomicU64,
    dropped: AtomicU64,
    last_load_bits: AtomicU64,
    origin: Instant,
    burst_window_start_ms: AtomicU64,
    burst_count: AtomicU64,
}

impl fmt::Debug for LogSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSampler")
            .field("strategy", &self.strategy())
            .field("rate", &self.rate())
            .field("dropped", &self.dropped_count())
            .finish_non_exhaustive()
    }
}

impl Default for LogSampler {
    fn default() -> Self {
        Self::new(SamplingStrategy::None, 1.0)
    }
}

impl LogSampler {
    /// Creates a sampler. A rate outside `[0, 1]` falls back to `1.0`.
    #[must_use]
    pub fn new(strategy: SamplingStrategy, rate: f64) -> Self {
        let rate = if (0.0..=1.0).contains(&rate) { rate } else { 1.0 };
        Self {
            strategy: AtomicU8::new(strategy.to_u8()),
            rate_bits: AtomicU64::new(rate.to_bits()),
            counter: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_load_bits: AtomicU64::new(0.0_f64.to_bits()),
            origin: Instant::now(),
            burst_window_start_ms: AtomicU64::new(0),
            burst_count: AtomicU64::new(0),
        }
    }

    /// The configured rate, before any load adjustment.
    #[must_use]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    /// Number of `should_sample` calls since the last reset.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    fn sample_uniform(rate: f64, index: u64) -> bool {
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        let interval = ((1.0 / rate).floor() as u64).max(1);
        index % interval == 0
    }

    fn sample_adaptive(&self, rate: f64) -> bool {
        let mut rng = rand::thread_rng();
        let load = rng.gen_range(0.0..MAX_SYNTHETIC_LOAD);
        self.last_load_bits.store(load.to_bits(), Ordering::Relaxed);
        let adjusted = (rate * (1.0 - load)).clamp(0.0, 1.0);
        rng.gen_bool(adjusted)
    }

    fn sample_burst(&self, rate: f64) -> bool {
        let limit = (rate * 10.0).floor() as u64;
        let now_ms = self.origin.elapsed().as_millis() as u64;
        let start = self.burst_window_start_ms.load(Ordering::Acquire);

        if now_ms.saturating_sub(start) >= BURST_WINDOW_MS
            && self
                .burst_window_start_ms
                .compare_exchange(start, now_ms, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.burst_count.store(0, Ordering::Release);
        }

        self.burst_count.fetch_add(1, Ordering::AcqRel) < limit
    }
}

impl Sampler for LogSampler {
    fn should_sample(&self) -> bool {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let rate = self.rate();

        let keep = match self.strategy() {
            SamplingStrategy::None => true,
            SamplingStrategy::Uniform => Self::sample_uniform(rate, index),
            SamplingStrategy::Adaptive => self.sample_adaptive(rate),
            SamplingStrategy::Burst => self.sample_burst(rate),
        };

        if !keep {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        keep
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn current_rate(&self) -> f64 {
        let rate = self.rate();
        match self.strategy() {
            SamplingStrategy::Adaptive => {
                let load = f64::from_bits(self.last_load_bits.load(Ordering::Relaxed));
                rate * (1.0 - load)
            }
            _ => rate,
        }
    }

    fn set_strategy(&self, strategy: SamplingStrategy, rate: f64) {
        let rate = if rate.is_nan() { 1.0 } else { rate.clamp(0.0, 1.0) };
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
        self.strategy.store(strategy.to_u8(), Ordering::Relaxed);
    }

    fn strategy(&self) -> SamplingStrategy {
        SamplingStrategy::from_u8(self.strategy.load(Ordering::Relaxed))
    }

    fn reset_stats(&self) {
        self.counter.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.burst_count.store(0, Ordering::Relaxed);
    }
}
