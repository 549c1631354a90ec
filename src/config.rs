// Analysis configuration
// Tunable constants for every stage, loadable from partial JSON files

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::events::GroupingConfig;
use crate::groove::{DrumMap, QuantizeSettings, TempoConfig, TrackerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a full analysis run
///
/// Every section falls back to its defaults, so a file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub grouping: GroupingConfig,
    pub tempo: TempoConfig,
    pub tracker: TrackerConfig,
    pub rhythm: QuantizeSettings,
    pub drum_map: DrumMap,
}

impl AnalysisConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = AnalysisConfig::from_json_str(&contents)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a stage degenerate
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("grouping.event_width_ms", self.grouping.event_width_ms)?;

        let tempo = &self.tempo;
        require_positive("tempo.cluster_width_ms", tempo.cluster_width_ms)?;
        require_positive("tempo.max_interval_ms", tempo.max_interval_ms)?;
        require_positive("tempo.min_bpm", tempo.min_bpm)?;
        require_positive("tempo.max_bpm", tempo.max_bpm)?;
        if tempo.min_bpm >= tempo.max_bpm {
            return Err(ConfigError::Invalid(format!(
                "tempo.min_bpm ({}) must be below tempo.max_bpm ({})",
                tempo.min_bpm, tempo.max_bpm
            )));
        }
        if tempo.max_multiple == 0 {
            return Err(ConfigError::Invalid("tempo.max_multiple must be at least 1".to_string()));
        }

        let tracker = &self.tracker;
        require_non_negative("tracker.inner_window_ms", tracker.inner_window_ms)?;
        require_positive("tracker.outer_window_factor", tracker.outer_window_factor)?;
        require_positive("tracker.initial_period_ms", tracker.initial_period_ms)?;
        require_positive("tracker.max_gap_ms", tracker.max_gap_ms)?;
        require_non_negative("tracker.correction_factor", tracker.correction_factor)?;
        require_non_negative("tracker.duplicate_interval_ms", tracker.duplicate_interval_ms)?;
        require_non_negative("tracker.duplicate_prediction_ms", tracker.duplicate_prediction_ms)?;
        require_positive("tracker.min_interval_ms", tracker.min_interval_ms)?;

        if self.rhythm.subdivisions_per_beat == 0 {
            return Err(ConfigError::Invalid(
                "rhythm.subdivisions_per_beat must be at least 1".to_string(),
            ));
        }

        if self.drum_map.is_empty() {
            log::warn!("Drum map is empty; the rhythm grid will have no drums");
        }

        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must not be negative, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groove::{Drum, ScoreNormalization};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.grouping.event_width_ms, 70.0);
        assert_eq!(config.tempo.max_interval_ms, 2000.0);
        assert_eq!(config.tracker.initial_period_ms, 5000.0);
        assert_eq!(config.rhythm.subdivisions_per_beat, 4);
        assert_eq!(config.drum_map.drum_for(36), Some(Drum::Kick));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnalysisConfig::from_json_str(
            r#"{"tempo": {"min_bpm": 80}, "tracker": {"score_normalization": "interval"}}"#,
        )
        .unwrap();

        assert_eq!(config.tempo.min_bpm, 80.0);
        assert_eq!(config.tempo.max_bpm, 240.0);
        assert_eq!(config.tracker.score_normalization, ScoreNormalization::Interval);
        assert_eq!(config.tracker.correction_factor, 0.2);
        assert_eq!(config.grouping, GroupingConfig::default());
    }

    #[test]
    fn test_drum_map_override_replaces_table() {
        let config = AnalysisConfig::from_json_str(r#"{"drum_map": {"60": "snare"}}"#).unwrap();

        assert_eq!(config.drum_map.drum_for(60), Some(Drum::Snare));
        assert_eq!(config.drum_map.drum_for(36), None);
    }

    #[test]
    fn test_rejects_inverted_bpm_range() {
        let result = AnalysisConfig::from_json_str(r#"{"tempo": {"min_bpm": 240, "max_bpm": 60}}"#);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_subdivisions() {
        let mut config = AnalysisConfig::default();
        config.rhythm.subdivisions_per_beat = 0;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_positive_window() {
        let mut config = AnalysisConfig::default();
        config.tracker.min_interval_ms = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.grouping.event_width_ms = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = AnalysisConfig::from_json_str("{not json");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("drumgrid.json");

        let mut config = AnalysisConfig::default();
        config.tracker.inner_window_ms = 25.0;
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AnalysisConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = AnalysisConfig::from_file(&temp_dir.path().join("missing.json"));

        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
