//! Configuration file support for Mindful.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/mindful/config.toml`.

use crate::controller::Cadence;
use crate::types::ExerciseDefinition;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Remote practice service. Without a `base_url` sessions are kept in the
/// local store under `data_dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Session timer configuration
///
/// The clock always ticks once per second; only the autosave cadence is
/// configurable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Overrides every exercise's own autosave interval
    #[serde(default)]
    pub autosave_secs: Option<u64>,
}

impl SessionConfig {
    /// Timer cadence for an exercise, applying any overrides
    pub fn cadence_for(&self, definition: &ExerciseDefinition) -> Cadence {
        let cadence = Cadence::for_exercise(definition);
        match self.autosave_secs {
            Some(secs) => cadence.with_autosave(Duration::from_secs(secs.max(1))),
            None => cadence,
        }
    }
}

// Default value functions
fn home_or_current() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_or_current().join(".local/share"));
    base.join("mindful")
}

fn default_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_or_current().join(".config"));
        base.join("mindful").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_default_catalog;
    use crate::types::ExerciseKind;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data.data_dir.ends_with("mindful"));
        assert_eq!(config.api.base_url, None);
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.session.autosave_secs, None);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.api.base_url = Some("http://localhost:3000/api".into());
        config.session.autosave_secs = Some(30);

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.api.base_url, parsed.api.base_url);
        assert_eq!(config.session.autosave_secs, parsed.session.autosave_secs);
        assert_eq!(config.data.data_dir, parsed.data.data_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[api]
base_url = "https://practice.example.org"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.api.base_url.as_deref(),
            Some("https://practice.example.org")
        );
        assert_eq!(config.api.timeout_secs, 15); // default
        assert_eq!(config.session.autosave_secs, None);
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.data.data_dir = dir.path().join("data");
        config.api.token = Some("secret".into());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.data.data_dir, dir.path().join("data"));
        assert_eq!(loaded.api.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\nautosave_secs = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Toml(_))));
    }

    #[test]
    fn test_cadence_overrides() {
        let catalog = build_default_catalog();
        let legacy = catalog.get(ExerciseKind::SelfAwareness).unwrap();
        let journal = catalog.get(ExerciseKind::GoodThingsJournal).unwrap();

        let session = SessionConfig::default();
        assert_eq!(session.cadence_for(legacy).autosave, Duration::from_secs(1));
        assert_eq!(session.cadence_for(journal).autosave, Duration::from_secs(10));
        assert_eq!(session.cadence_for(journal).tick, Duration::from_secs(1));

        let session = SessionConfig {
            autosave_secs: Some(30),
        };
        let cadence = session.cadence_for(legacy);
        assert_eq!(cadence.autosave, Duration::from_secs(30));
        assert_eq!(cadence.tick, Duration::from_secs(1));
    }
}
