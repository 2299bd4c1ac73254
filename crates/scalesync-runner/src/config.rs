//! Runner configuration and recipe files.

use std::path::Path;
use std::time::Duration;

use scalesync_protocol::Recipe;
use scalesync_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

/// Default address of the serial-to-TCP bridge.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4040";

/// Configuration for the `scalesync` runner.
///
/// ```yaml
/// address: 192.168.1.20:4040
/// connect_timeout_ms: 3000
/// session:
///   name: pantry
///   pacing_delay_ms: 500
///   title_format: bare
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// `host:port` of the bridge exposing the scale's serial link.
    pub address: String,
    /// How long to wait for the TCP connection.
    pub connect_timeout_ms: u64,
    /// Session settings.
    pub session: SessionConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout_ms: 5000,
            session: SessionConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| RunnerError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Load one recipe from YAML:
///
/// ```yaml
/// title: Soup
/// steps:
///   - body: Water
///     weight: "500"
///   - body: Simmer
/// ```
pub fn load_recipe(path: &Path) -> RunnerResult<Recipe> {
    let text = std::fs::read_to_string(path)?;
    parse_recipe(&text).map_err(|source| RunnerError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// Load a list of recipes from YAML (a sequence of recipe documents).
pub fn load_recipes(path: &Path) -> RunnerResult<Vec<Recipe>> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|source| RunnerError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

fn parse_recipe(text: &str) -> Result<Recipe, serde_yaml::Error> {
    serde_yaml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalesync_protocol::{Step, TitleListFormat};

    #[test]
    fn test_runner_config_defaults() {
        let config: RunnerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_runner_config_nested_session() {
        let yaml = "address: 10.0.0.5:7000\nsession:\n  name: pantry\n  title_format: bare\n";
        let config: RunnerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.address, "10.0.0.5:7000");
        assert_eq!(config.session.name, "pantry");
        assert_eq!(config.session.title_format, TitleListFormat::Bare);
        assert_eq!(config.session.pacing_delay_ms, SessionConfig::default().pacing_delay_ms);
    }

    #[test]
    fn test_demo_files_load() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");

        let config = RunnerConfig::load(&demos.join("scalesync.yaml")).unwrap();
        assert_eq!(config.session.name, "kitchen");

        let pantry = load_recipes(&demos.join("pantry.yaml")).unwrap();
        assert_eq!(pantry.len(), 2);
        let soup = load_recipe(&demos.join("soup.yaml")).unwrap();
        for recipe in pantry.iter().chain(std::iter::once(&soup)) {
            assert!(recipe.validate().is_ok(), "{} is not valid", recipe.title);
        }
    }

    #[test]
    fn test_parse_recipe() {
        let yaml = "title: Soup\nsteps:\n  - body: Water\n    weight: \"500\"\n  - body: Simmer\n";
        let recipe = parse_recipe(yaml).unwrap();
        assert_eq!(
            recipe,
            Recipe::new(
                "Soup",
                vec![Step::weighted("Water", "500"), Step::instruction("Simmer")]
            )
        );
    }
}
