//! Overlay configuration
//!
//! Topic names and liveness timings. The defaults are the protocol constants;
//! peers that disagree on them will not see each other.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, BeaconResult};

/// Interval between heartbeat signals.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10_000);

/// A peer not heard from for longer than this is no longer live.
pub const PEER_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Default topic prefix shared by all Beacon topics.
pub const DEFAULT_TOPIC_PREFIX: &str = "/beacon/1";

/// Topic names and timings for one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Topic carrying chat envelopes
    pub chat_topic: String,
    /// Topic carrying announce, heartbeat and response signals
    pub discovery_topic: String,
    /// Reserved heartbeat topic. Heartbeats travel on `discovery_topic`;
    /// this name is carried so deployments can agree on it.
    pub heartbeat_topic: String,
    /// Interval between heartbeat signals
    #[serde(with = "millis")]
    pub heartbeat_interval: Duration,
    /// Liveness window
    #[serde(with = "millis")]
    pub peer_timeout: Duration,
}

impl OverlayConfig {
    /// Build a config whose topics live under `prefix` (e.g. `/beacon/1`).
    pub fn with_topic_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            chat_topic: format!("{}/chat/json", prefix),
            discovery_topic: format!("{}/discovery/json", prefix),
            heartbeat_topic: format!("{}/heartbeat/json", prefix),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            peer_timeout: PEER_TIMEOUT,
        }
    }

    /// Check the config is usable.
    pub fn validate(&self) -> BeaconResult<()> {
        for (name, topic) in [
            ("chat_topic", &self.chat_topic),
            ("discovery_topic", &self.discovery_topic),
            ("heartbeat_topic", &self.heartbeat_topic),
        ] {
            if topic.trim().is_empty() {
                return Err(BeaconError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.chat_topic == self.discovery_topic {
            return Err(BeaconError::Config(
                "chat_topic and discovery_topic must differ".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(BeaconError::Config(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }

        if self.peer_timeout < self.heartbeat_interval {
            return Err(BeaconError::Config(format!(
                "peer_timeout ({:?}) must be at least heartbeat_interval ({:?})",
                self.peer_timeout, self.heartbeat_interval
            )));
        }

        Ok(())
    }

    /// Liveness window in milliseconds.
    pub fn peer_timeout_ms(&self) -> i64 {
        self.peer_timeout.as_millis() as i64
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::with_topic_prefix(DEFAULT_TOPIC_PREFIX)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let config = OverlayConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(10_000));
        assert_eq!(config.peer_timeout, Duration::from_millis(20_000));
        assert_eq!(config.chat_topic, "/beacon/1/chat/json");
        assert_eq!(config.discovery_topic, "/beacon/1/discovery/json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_topic_prefix_trailing_slash() {
        let config = OverlayConfig::with_topic_prefix("/team-a/");
        assert_eq!(config.chat_topic, "/team-a/chat/json");
        assert_eq!(config.heartbeat_topic, "/team-a/heartbeat/json");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = OverlayConfig {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BeaconError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_timeout_below_interval() {
        let config = OverlayConfig {
            peer_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("peer_timeout"));
    }

    #[test]
    fn test_validate_rejects_shared_topic() {
        let mut config = OverlayConfig::default();
        config.discovery_topic = config.chat_topic.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_uses_millis() {
        let json = serde_json::to_value(OverlayConfig::default()).unwrap();
        assert_eq!(json["heartbeat_interval"], 10_000);
        assert_eq!(json["peer_timeout"], 20_000);

        let back: OverlayConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, OverlayConfig::default());
    }
}
