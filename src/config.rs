//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters of one client session.
///
/// Durations deserialize from humantime strings ("30s", "2m30s").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity interval after which a liveness probe is sent.
    /// Zero disables keepalive monitoring.
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
    /// How long to wait for the probe response before declaring the
    /// connection lost.
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
    /// Deliver messages to each subscription in arrival order. Disabling
    /// this runs every callback on its own task.
    pub order: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            order: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        assert_eq!(config.ping_timeout, Duration::from_secs(10));
        assert!(config.order);
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: SessionConfig = toml::from_str(
            r#"
            keep_alive = "2m"
            ping_timeout = "1500ms"
            order = false
            "#,
        )
        .unwrap();
        assert_eq!(config.keep_alive, Duration::from_secs(120));
        assert_eq!(config.ping_timeout, Duration::from_millis(1500));
        assert!(!config.order);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
