//! Application configuration
//!
//! Persistent defaults for the synthesis parameters and logging, stored as
//! TOML under the platform config directory. Command-line flags override
//! everything here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::timeline::KnotPolicy;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Synthesis defaults applied when flags are omitted
    pub synthesis: SynthesisDefaults,

    /// Logging settings
    pub logging: LogConfig,
}

/// Default course parameters for the inject pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisDefaults {
    /// Start altitude in meters
    pub start_altitude: f64,

    /// Course bearing in degrees, 0 = north
    pub bearing_degrees: f64,

    /// Constant grade ratio (0.10 = 10%)
    pub grade: f64,

    /// Peak-to-peak altitude noise in meters
    pub noise_amplitude: f64,

    /// Duplicate-timestamp handling for the distance timeline
    pub knot_policy: KnotPolicy,
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            start_altitude: 0.0,
            bearing_degrees: 0.0,
            grade: 0.10,
            noise_amplitude: 0.0,
            knot_policy: KnotPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;
        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inclinefit")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.synthesis.grade = 0.08;
        config.synthesis.bearing_degrees = 45.0;
        config.synthesis.knot_policy = KnotPolicy::Mean;

        let toml_str = toml::to_string(&config).unwrap();
        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str("[synthesis]\ngrade = 0.05\n").unwrap();
        assert_eq!(config.synthesis.grade, 0.05);
        assert_eq!(config.synthesis.bearing_degrees, 0.0);
        assert_eq!(config.synthesis.knot_policy, KnotPolicy::FirstSeen);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.synthesis.noise_amplitude = 0.4;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_falls_back() {
        assert!(AppConfig::load_from_file("/nonexistent/config.toml").is_err());
    }
}
