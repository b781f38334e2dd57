//! Configuration for the MIDI DMX bridge
//!
//! Loaded from a YAML file. Every section is optional and falls back to defaults, so an
//! absent file is a valid (empty) configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::learn::DEFAULT_LEARN_TIMEOUT;
use crate::mapping::DEFAULT_DEBOUNCE_MS;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub learn: LearnConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MIDI inputs attached at startup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Port names or case-insensitive substrings
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LearnConfig {
    #[serde(default = "default_learn_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// JSON file holding `midiMappings`; relative paths resolve against the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mappings_file: Option<PathBuf>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files; unset keeps the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            client_name: default_client_name(),
        }
    }
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_learn_timeout_ms(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mappings_file: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation.
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.learn.timeout_ms == 0 {
            anyhow::bail!("learn.timeout_ms must be greater than zero");
        }
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }
        if let Some(input) = self.midi.inputs.iter().find(|i| i.trim().is_empty()) {
            anyhow::bail!("midi.inputs contains an empty port name: {:?}", input);
        }
        Ok(())
    }

    pub fn learn_timeout(&self) -> Duration {
        Duration::from_millis(self.learn.timeout_ms)
    }

    /// Mapping file, resolving relative paths against `base_dir`
    pub fn mappings_file(&self, base_dir: &Path) -> Option<PathBuf> {
        self.persistence.mappings_file.as_ref().map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                base_dir.join(file)
            }
        })
    }
}

fn default_client_name() -> String { "MIDI DMX Bridge".to_string() }
fn default_learn_timeout_ms() -> u64 { DEFAULT_LEARN_TIMEOUT.as_millis() as u64 }
fn default_debounce_ms() -> u64 { DEFAULT_DEBOUNCE_MS }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
midi:
  inputs:
    - nanoKONTROL2
learn:
  timeout_ms: 5000
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.midi.inputs, vec!["nanoKONTROL2".to_string()]);
        assert_eq!(config.midi.client_name, "MIDI DMX Bridge");
        assert_eq!(config.learn_timeout(), Duration::from_secs(5));
        assert_eq!(config.persistence.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.learn.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_mappings_file() {
        let mut config = AppConfig::default();
        assert_eq!(config.mappings_file(Path::new("/srv/bridge")), None);

        config.persistence.mappings_file = Some(PathBuf::from("data/config.json"));
        assert_eq!(
            config.mappings_file(Path::new("/srv/bridge")),
            Some(PathBuf::from("/srv/bridge/data/config.json"))
        );
    }

    #[tokio::test]
    async fn test_load_missing_and_invalid() {
        let dir = tempdir().unwrap();

        let missing = AppConfig::load(&dir.path().join("config.yaml")).await.unwrap();
        assert_eq!(missing, AppConfig::default());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "learn: [not, a, map]").unwrap();
        assert!(AppConfig::load(&bad).await.is_err());
    }
}
