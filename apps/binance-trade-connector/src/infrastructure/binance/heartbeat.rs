//! Stream Heartbeat
//!
//! Detects half-open aggTrade connections. The client pings on a fixed
//! interval; a connection that yields no frame of any kind for one interval
//! plus the pong timeout is treated as lost and goes through reconnection.

use std::time::Duration;

use tokio::time::Instant;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Time allowed for a reply after a ping.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from_settings(&WebSocketSettings::default())
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_settings(settings: &WebSocketSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }

    /// Longest silence tolerated on a connection.
    #[must_use]
    pub const fn idle_limit(&self) -> Duration {
        self.ping_interval.saturating_add(self.pong_timeout)
    }
}

/// Time of the last frame seen on one connection.
#[derive(Debug)]
pub(crate) struct Liveness {
    last_seen: Instant,
    limit: Duration,
}

impl Liveness {
    pub(crate) fn new(config: &HeartbeatConfig) -> Self {
        Self {
            last_seen: Instant::now(),
            limit: config.idle_limit(),
        }
    }

    /// Record activity on the connection.
    pub(crate) fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// When the connection is considered dead without further frames.
    pub(crate) fn deadline(&self) -> Instant {
        self.last_seen + self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_follows_websocket_settings() {
        let config = HeartbeatConfig::default();

        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_timeout, Duration::from_secs(20));
        assert_eq!(config.idle_limit(), Duration::from_secs(40));
    }

    #[test]
    fn idle_limit_saturates() {
        let config = HeartbeatConfig::new(Duration::MAX, Duration::from_secs(1));
        assert_eq!(config.idle_limit(), Duration::MAX);
    }

    #[test]
    fn touch_pushes_deadline_forward() {
        let config = HeartbeatConfig::new(Duration::from_millis(10), Duration::from_millis(5));
        let mut liveness = Liveness::new(&config);
        let first = liveness.deadline();

        std::thread::sleep(Duration::from_millis(5));
        liveness.touch();

        assert!(liveness.deadline() > first);
        assert!(liveness.deadline() <= Instant::now() + Duration::from_millis(15));
    }
}
