//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// FIX session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upstream host.
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// Our CompID (tag 49).
    pub sender_comp_id: String,
    /// Exchange CompID (tag 56).
    pub target_comp_id: String,
    /// HeartBtInt (tag 108) in seconds. Default: 30.
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
    /// Base delay for reconnect backoff (ms). Default: 1000.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Cap for reconnect backoff (ms). Default: 30000.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Reconnect attempts before surrendering. Default: 5.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Grace between TCP up and logon ack (ms). Default: 5000.
    #[serde(default = "default_logon_timeout_ms")]
    pub logon_timeout_ms: u64,
}

fn default_heartbeat_interval_s() -> u64 {
    30
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_cap_ms() -> u64 {
    30000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_logon_timeout_ms() -> u64 {
    5000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            sender_comp_id: String::new(),
            target_comp_id: String::new(),
            heartbeat_interval_s: default_heartbeat_interval_s(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            logon_timeout_ms: default_logon_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_s)
    }

    /// Inbound-idle threshold before a TestRequest goes out.
    pub fn test_request_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_s * 1500)
    }

    pub fn logon_timeout(&self) -> Duration {
        Duration::from_millis(self.logon_timeout_ms)
    }

    /// Backoff delay for a reconnect attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .reconnect_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_cap_ms);
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval_s, 30);
        assert_eq!(config.reconnect_max_attempts, 5);
        assert_eq!(config.logon_timeout_ms, 5000);
    }

    #[test]
    fn test_backoff_progression() {
        let config = SessionConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(config.backoff_delay(5), Duration::from_millis(16000));
        assert_eq!(config.backoff_delay(6), Duration::from_millis(30000));
    }

    #[test]
    fn test_test_request_threshold_is_one_and_a_half_intervals() {
        let config = SessionConfig {
            heartbeat_interval_s: 30,
            ..Default::default()
        };
        assert_eq!(config.test_request_after(), Duration::from_secs(45));
    }
}
