//! Reconnection Policy
//!
//! Exponential backoff with jitter for re-establishing a dropped venue
//! feed. The attempt counter covers consecutive failures only; a feed
//! resets its policy once a connection is established again.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::WebSocketSettings;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after every attempt.
    pub multiplier: f64,
    /// Symmetric jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_settings(&WebSocketSettings::default())
    }
}

impl ReconnectConfig {
    /// Build from WebSocket settings with ±10% jitter.
    #[must_use]
    pub const fn from_settings(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Same parameters without jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    const fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }
}

/// Stateful backoff sequence.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use binance_trade_connector::infrastructure::binance::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_millis(300),
///     multiplier: 2.0,
///     jitter_factor: 0.0,
///     max_attempts: 3,
/// });
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
/// assert_eq!(policy.next_delay(), None);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    next_base: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start a fresh sequence.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let next_base = config.initial_delay;
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts += 1;

        let base = self.next_base.min(self.config.max_delay);
        self.next_base = scale(base, self.config.multiplier).min(self.config.max_delay);

        Some(jitter(base, self.config.jitter_factor))
    }

    /// Restart the sequence after a successful connection.
    pub const fn reset(&mut self) {
        self.next_base = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.is_unlimited() || self.attempts < self.config.max_attempts
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(delay: Duration, multiplier: f64) -> Duration {
    let millis = (delay.as_millis() as f64 * multiplier).round();
    if !millis.is_finite() || millis <= 0.0 {
        return Duration::ZERO;
    }
    if millis >= u64::MAX as f64 {
        return Duration::from_millis(u64::MAX);
    }
    Duration::from_millis(millis as u64)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }

    let millis = delay.as_millis() as f64;
    let spread = millis * factor;
    let offset: f64 = rand::rng().random_range(-spread..=spread);
    Duration::from_millis((millis + offset).max(1.0) as u64)
}
