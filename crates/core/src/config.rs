//! Engine configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid configuration
//! and a file only needs to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TagName;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Session sizing and lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub base_length: u32,
    pub min_length: u32,
    pub max_length: u32,
    pub onboarding_length: u32,
    /// Sessions that must be completed before adaptive sizing kicks in.
    pub onboarding_sessions: u32,
    /// Inactivity window after which an active session is regenerated.
    pub stale_after_hours: u32,
    /// Draw new problems that tie on focus and difficulty at random instead of by id.
    pub shuffle_new: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_length: 6,
            min_length: 3,
            max_length: 8,
            onboarding_length: 4,
            onboarding_sessions: 1,
            stale_after_hours: 48,
            shuffle_new: false,
        }
    }
}

/// Difficulty-cap progression thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    pub high_accuracy: f64,
    pub low_accuracy: f64,
    pub promotion_streak: u32,
    pub demotion_streak: u32,
    /// Number of recent session accuracies kept for the rolling mean.
    pub rolling_window: usize,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            high_accuracy: 0.8,
            low_accuracy: 0.6,
            promotion_streak: 3,
            demotion_streak: 3,
            rolling_window: 5,
        }
    }
}

/// Which stability model drives review-interval scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityKind {
    #[default]
    Fsrs,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub stability: StabilityKind,
    pub desired_retention: f32,
    /// Trailing failures after which a problem is put on cooldown.
    pub cooldown_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stability: StabilityKind::Fsrs,
            desired_retention: 0.9,
            cooldown_failures: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryConfig {
    pub min_attempts: u32,
    pub success_rate: f64,
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            min_attempts: 3,
            success_rate: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub progression: ProgressionConfig,
    pub scheduler: SchedulerConfig,
    pub mastery: MasteryConfig,
    /// Upper bound for any single repository call.
    pub storage_timeout_ms: u64,
    /// Learner-chosen focus tags; overrides tier suggestions when non-empty.
    pub focus_areas: Vec<TagName>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            progression: ProgressionConfig::default(),
            scheduler: SchedulerConfig::default(),
            mastery: MasteryConfig::default(),
            storage_timeout_ms: 5_000,
            focus_areas: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and `ConfigError::Invalid`
    /// for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    #[must_use]
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session.stale_after_hours))
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.min_length == 0 {
            return Err(invalid("session.min_length", "must be at least 1"));
        }
        if s.min_length > s.max_length {
            return Err(invalid(
                "session.min_length",
                format!("{} exceeds max_length {}", s.min_length, s.max_length),
            ));
        }
        if !(s.min_length..=s.max_length).contains(&s.base_length) {
            return Err(invalid(
                "session.base_length",
                format!("must lie in {}..={}", s.min_length, s.max_length),
            ));
        }
        if s.onboarding_length == 0 {
            return Err(invalid("session.onboarding_length", "must be at least 1"));
        }

        let p = &self.progression;
        let unit = 0.0..=1.0;
        if !unit.contains(&p.low_accuracy) || !unit.contains(&p.high_accuracy) {
            return Err(invalid("progression", "accuracy thresholds must lie in [0, 1]"));
        }
        if p.low_accuracy > p.high_accuracy {
            return Err(invalid(
                "progression.low_accuracy",
                "must not exceed high_accuracy",
            ));
        }
        if p.promotion_streak == 0 || p.demotion_streak == 0 {
            return Err(invalid("progression", "streak lengths must be at least 1"));
        }
        if p.rolling_window == 0 {
            return Err(invalid("progression.rolling_window", "must be at least 1"));
        }

        let r = self.scheduler.desired_retention;
        if !(r > 0.0 && r <= 1.0) {
            return Err(invalid(
                "scheduler.desired_retention",
                format!("must be in (0, 1], got {r}"),
            ));
        }

        if !(0.0..=1.0).contains(&self.mastery.success_rate) {
            return Err(invalid("mastery.success_rate", "must lie in [0, 1]"));
        }
        if self.storage_timeout_ms == 0 {
            return Err(invalid("storage_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.session.min_length, 3);
        assert_eq!(config.session.max_length, 8);
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            focus_areas = ["Graph", "tree"]

            [session]
            shuffle_new = true

            [progression]
            promotion_streak = 2

            [scheduler]
            stability = "exponential"
            "#,
        )
        .unwrap();
        assert_eq!(config.progression.promotion_streak, 2);
        assert!(config.session.shuffle_new);
        assert_eq!(config.session.base_length, 6);
        assert_eq!(config.progression.high_accuracy, 0.8);
        assert_eq!(config.scheduler.stability, StabilityKind::Exponential);
        assert_eq!(config.focus_areas[0].as_str(), "graph");
    }

    #[test]
    fn rejects_inverted_length_band() {
        let err = EngineConfig::from_toml_str(
            r"
            [session]
            min_length = 9
            max_length = 4
            ",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "session.min_length",
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_accuracy_thresholds() {
        let err = EngineConfig::from_toml_str(
            r"
            [progression]
            low_accuracy = 0.9
            high_accuracy = 0.5
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("session = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
