//! Bounded backoff with optional jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay grows from one retry to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Growth {
    /// Always `min`.
    Constant,
    /// `min * retry`.
    Linear,
    /// `min * 2^(retry - 1)`.
    #[default]
    Exponential,
}

/// Delay range `[min, max]` plus growth rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
    pub growth: Growth,
    /// Add up to 10% on top of the computed delay (still capped at `max`).
    pub jitter: bool,
}

impl Backoff {
    /// Exponential backoff without jitter.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            growth: Growth::Exponential,
            jitter: false,
        }
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let min_ms = self.min.as_millis() as u64;
        let max_ms = (self.max.as_millis() as u64).max(min_ms);

        let grown = match self.growth {
            Growth::Constant => min_ms,
            Growth::Linear => min_ms.saturating_mul(u64::from(retry)),
            Growth::Exponential => min_ms.saturating_mul(2u64.saturating_pow(retry - 1)),
        };
        let capped = grown.clamp(min_ms, max_ms);

        // Apply jitter (0 to 10% of the delay)
        let jitter_range = capped / 10;
        let jitter = if self.jitter && jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis((capped + jitter).min(max_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(5))
    }
}
