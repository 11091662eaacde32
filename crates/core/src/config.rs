//! Deployment configuration for the signing gate.
//!
//! Thresholds are calibrated per deployment, so every tunable lives here and
//! is passed to the use cases at construction instead of being compiled in.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignConfig {
    /// Detections below this confidence are ignored.
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f64,

    /// Cosine similarity a probe must reach against the best enrolled pose.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Top-two detection confidences closer than this reject the image.
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,

    /// Minimum face crop side in pixels.
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,

    /// Re-signing an already signed document returns the existing result
    /// instead of failing with `AlreadySigned`.
    #[serde(default = "default_allow_resign_noop")]
    pub allow_resign_noop: bool,

    /// Budget for detection + extraction + matching of one request.
    #[serde(default = "default_sign_timeout_ms")]
    pub sign_timeout_ms: u64,
}

fn default_min_detection_confidence() -> f64 {
    0.5
}

fn default_match_threshold() -> f64 {
    0.6
}

fn default_ambiguity_margin() -> f64 {
    0.1
}

fn default_min_face_size() -> u32 {
    32
}

fn default_allow_resign_noop() -> bool {
    true
}

fn default_sign_timeout_ms() -> u64 {
    10_000
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: default_min_detection_confidence(),
            match_threshold: default_match_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
            min_face_size: default_min_face_size(),
            allow_resign_noop: default_allow_resign_noop(),
            sign_timeout_ms: default_sign_timeout_ms(),
        }
    }
}

impl SignConfig {
    /// Loads and validates a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SignConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_detection_confidence must be between 0.0 and 1.0, got {}",
                self.min_detection_confidence
            )));
        }
        if !(-1.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be between -1.0 and 1.0, got {}",
                self.match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.ambiguity_margin) {
            return Err(ConfigError::Invalid(format!(
                "ambiguity_margin must be between 0.0 and 1.0, got {}",
                self.ambiguity_margin
            )));
        }
        if self.min_face_size == 0 {
            return Err(ConfigError::Invalid("min_face_size must be positive".into()));
        }
        if self.sign_timeout_ms == 0 {
            return Err(ConfigError::Invalid("sign_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn sign_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SignConfig::default();
        assert_eq!(config.min_detection_confidence, 0.5);
        assert_eq!(config.match_threshold, 0.6);
        assert!(config.allow_resign_noop);
        assert_eq!(config.sign_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("facesign.json");
        fs::write(&path, r#"{ "match_threshold": 0.9, "allow_resign_noop": false }"#).unwrap();

        let config = SignConfig::load(&path).unwrap();
        assert_eq!(config.match_threshold, 0.9);
        assert!(!config.allow_resign_noop);
        assert_eq!(config.min_face_size, 32);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("facesign.json");
        fs::write(&path, r#"{ "match_treshold": 0.9 }"#).unwrap();
        assert!(matches!(SignConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = SignConfig::load(Path::new("/nonexistent/facesign.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[rstest]
    #[case::confidence(SignConfig { min_detection_confidence: 1.5, ..SignConfig::default() })]
    #[case::threshold(SignConfig { match_threshold: -2.0, ..SignConfig::default() })]
    #[case::margin(SignConfig { ambiguity_margin: -0.1, ..SignConfig::default() })]
    #[case::face_size(SignConfig { min_face_size: 0, ..SignConfig::default() })]
    #[case::timeout(SignConfig { sign_timeout_ms: 0, ..SignConfig::default() })]
    fn test_validate_rejects(#[case] config: SignConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
