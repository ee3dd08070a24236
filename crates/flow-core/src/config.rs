//! Tick timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Configuration for a scheduler and the drivers running on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Label attached to tracing events.
    pub label: String,
    /// Delay between consecutive ticks of one driver, in milliseconds.
    pub tick_delay_ms: Option<u64>,
    /// Number of back-to-back ticks before yielding to the runtime.
    pub yield_interval: u32,
}

fn default_yield_interval() -> u32 {
    64
}

impl SchedulerConfig {
    /// Create a new configuration with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, StreamError> {
        toml::from_str(input).map_err(|e| StreamError::config(e.to_string()))
    }

    /// Set the tracing label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set a delay between ticks.
    ///
    /// Delays beyond `u64::MAX` milliseconds saturate.
    pub fn with_tick_delay(mut self, delay: Duration) -> Self {
        self.tick_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set how many ticks run before yielding (0 is treated as 1).
    pub fn with_yield_interval(mut self, ticks: u32) -> Self {
        self.yield_interval = ticks;
        self
    }

    /// Get the configured tick delay.
    pub fn tick_delay(&self) -> Option<Duration> {
        self.tick_delay_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            label: "default".to_string(),
            tick_delay_ms: None,
            yield_interval: default_yield_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SchedulerConfig::default();

        assert_eq!(config.label, "default");
        assert_eq!(config.tick_delay(), None);
        assert_eq!(config.yield_interval, 64);
    }

    #[test]
    fn test_config_builder_chain() {
        let config = SchedulerConfig::default()
            .with_label("ui")
            .with_tick_delay(Duration::from_millis(16))
            .with_yield_interval(8);

        assert_eq!(config.label, "ui");
        assert_eq!(config.tick_delay(), Some(Duration::from_millis(16)));
        assert_eq!(config.yield_interval, 8);
    }

    #[test]
    fn test_config_zero_delay_is_none() {
        let config = SchedulerConfig::default().with_tick_delay(Duration::ZERO);

        assert_eq!(config.tick_delay_ms, Some(0));
        assert_eq!(config.tick_delay(), None);
    }

    #[test]
    fn test_config_huge_delay_saturates() {
        let config = SchedulerConfig::default().with_tick_delay(Duration::MAX);

        assert_eq!(config.tick_delay_ms, Some(u64::MAX));
    }

    #[test]
    fn test_config_from_toml() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            label = "timer"
            tick_delay_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.label, "timer");
        assert_eq!(config.tick_delay(), Some(Duration::from_millis(5)));
        assert_eq!(config.yield_interval, 64);
    }

    #[test]
    fn test_config_from_invalid_toml() {
        let err = SchedulerConfig::from_toml_str("yield_interval = \"often\"").unwrap_err();

        assert!(err.is_config());
    }
}
