//! Session configuration.

use std::path::Path;
use std::time::Duration;

use scalesync_protocol::{TitleListFormat, MAX_DEVICE_RECIPES};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Configuration for a sync session.
///
/// Timings are in milliseconds so the YAML stays readable:
///
/// ```yaml
/// name: kitchen
/// probe_timeout_ms: 1500
/// pacing_delay_ms: 500
/// title_format: bare
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name used in logs and metric labels.
    pub name: String,

    /// How long to wait for `CONN?` after sending the `CONN` probe.
    pub probe_timeout_ms: u64,

    /// Delay before each recipe record, so the scale's serial buffer keeps up.
    pub pacing_delay_ms: u64,

    /// How long to wait for `READY`, `SUCCESS`, or a titles listing.
    pub response_timeout_ms: u64,

    /// Track the listing the scale pushes after connect as a list transfer.
    pub list_on_connect: bool,

    /// Layout of the titles listing.
    pub title_format: TitleListFormat,

    /// Reject adds once the local list holds this many recipes.
    /// `None` disables the check.
    pub max_recipes: Option<usize>,

    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            name: "scale".to_string(),
            probe_timeout_ms: 1500,
            pacing_delay_ms: 500,
            response_timeout_ms: 10_000,
            list_on_connect: true,
            title_format: TitleListFormat::Counted,
            max_recipes: Some(MAX_DEVICE_RECIPES),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> SessionResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Set the session name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the probe timeout.
    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = ms;
        self
    }

    /// Set the inter-record pacing delay.
    pub fn with_pacing_delay_ms(mut self, ms: u64) -> Self {
        self.pacing_delay_ms = ms;
        self
    }

    /// Set the response timeout.
    pub fn with_response_timeout_ms(mut self, ms: u64) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    /// Enable or disable tracking the listing pushed after connect.
    pub fn with_list_on_connect(mut self, enabled: bool) -> Self {
        self.list_on_connect = enabled;
        self
    }

    /// Set the titles listing layout.
    pub fn with_title_format(mut self, format: TitleListFormat) -> Self {
        self.title_format = format;
        self
    }

    /// Set the recipe cap. Pass None to disable the check.
    pub fn with_max_recipes(mut self, max: Option<usize>) -> Self {
        self.max_recipes = max;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.pacing_delay(), Duration::from_millis(500));
        assert_eq!(config.max_recipes, Some(9));
        assert!(config.list_on_connect);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SessionConfig::from_yaml_str("name: kitchen\ntitle_format: bare\npacing_delay_ms: 50\n").unwrap();
        assert_eq!(config.name, "kitchen");
        assert_eq!(config.title_format, TitleListFormat::Bare);
        assert_eq!(config.pacing_delay_ms, 50);
        assert_eq!(config.probe_timeout_ms, 1500);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = SessionConfig::from_yaml_str("probe_timeout_ms: soon").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_name("test")
            .with_probe_timeout_ms(10)
            .with_max_recipes(None)
            .with_list_on_connect(false);
        assert_eq!(config.name, "test");
        assert_eq!(config.probe_timeout_ms, 10);
        assert_eq!(config.max_recipes, None);
        assert!(!config.list_on_connect);
    }
}
