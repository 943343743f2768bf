//! Reconnect delay policy.

use std::time::Duration;

use crate::config::ReconnectSettings;

/// Bounded exponential backoff: `min(initial * 2^attempt, max)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(settings: ReconnectSettings) -> Self {
        Self {
            initial: settings.initial_delay,
            max: settings.max_delay,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called after a session opened successfully.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}
