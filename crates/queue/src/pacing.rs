//! Pacing between outbound sends.
//!
//! Upstream chat platforms throttle or ban accounts that send in bursts, so
//! broadcast sends are spaced by a fixed base delay plus uniform jitter.

use std::time::Duration;

use rand::Rng;
use rover_common::TimingConfig;

/// Pacing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    /// Fixed part of every pause.
    pub base: Duration,
    /// Lower bound of the random part.
    pub jitter_min: Duration,
    /// Upper bound of the random part.
    pub jitter_max: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

impl PacingConfig {
    #[must_use]
    pub fn from_timing(timing: &TimingConfig) -> Self {
        let (jitter_min, jitter_max) = timing.broadcast_jitter();
        Self {
            base: timing.broadcast_base_delay(),
            jitter_min,
            jitter_max,
        }
    }

    /// No pauses at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }
}

/// Inserts pauses between consecutive sends.
#[derive(Debug)]
pub struct Pacer {
    config: PacingConfig,
    sent_any: bool,
}

impl Pacer {
    #[must_use]
    pub const fn new(config: PacingConfig) -> Self {
        Self {
            config,
            sent_any: false,
        }
    }

    /// Pick one pause length.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let lo = self.config.jitter_min.min(self.config.jitter_max);
        let hi = self.config.jitter_min.max(self.config.jitter_max);
        let jitter = if lo == hi {
            lo
        } else {
            rand::thread_rng().gen_range(lo..=hi)
        };
        self.config.base + jitter
    }

    /// Wait before a send. The first send of a pacer goes out immediately.
    pub async fn before_send(&mut self) {
        if !self.sent_any {
            self.sent_any = true;
            return;
        }

        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis(), "Pacing broadcast");
            tokio::time::sleep(delay).await;
        }
    }
}
