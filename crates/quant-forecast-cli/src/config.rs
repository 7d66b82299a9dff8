//! Engine defaults loaded from a TOML file.
//!
//! Precedence is command-line flag, then config file, then the built-in
//! defaults below. Without `--config`, `qf.toml` in the working directory is
//! used when it exists.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "qf.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Defaults shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Overrides the periods-per-year implied by the return frequency
    pub periods_per_year: Option<f64>,
    pub confidence_level: f64,
    pub mc_draws: usize,
    pub seed: Option<u64>,
    pub sample_paths: usize,
    /// Annual risk-free rate
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            periods_per_year: None,
            confidence_level: 0.95,
            mc_draws: 10_000,
            seed: None,
            sample_paths: 30,
            risk_free_rate: 0.0,
        }
    }
}

impl EngineConfig {
    /// Load from an explicit path, else from `qf.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                if !p.is_file() {
                    return Err(ConfigError::NotFound(p.display().to_string()));
                }
                Self::from_file(p)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loading engine config");
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(p) = self.periods_per_year {
            if !p.is_finite() || p <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "periods_per_year",
                    reason: format!("must be positive, got {p}"),
                });
            }
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "confidence_level",
                reason: format!("must lie in (0, 1), got {}", self.confidence_level),
            });
        }
        if self.mc_draws == 0 {
            return Err(ConfigError::InvalidValue {
                key: "mc_draws",
                reason: "must be at least 1".into(),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "risk_free_rate",
                reason: "must be finite".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("seed = 7\nconfidence_level = 0.99\n");
        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.confidence_level, 0.99);
        assert_eq!(config.mc_draws, 10_000);
        assert_eq!(config.sample_paths, 30);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = write_config("horizon_days = 30\n");
        assert!(matches!(
            EngineConfig::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let file = write_config("confidence_level = 1.5\n");
        assert!(matches!(
            EngineConfig::load(Some(file.path())),
            Err(ConfigError::InvalidValue {
                key: "confidence_level",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            EngineConfig::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }
}
