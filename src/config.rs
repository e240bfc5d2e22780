// Configuration - TOML file with quantize, instrument, output, and storage sections
// Every field has a default, so an empty or missing file is valid

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::arranger::dual_staff::DEFAULT_TITLE;
use crate::events::types::ql;
use crate::fretboard::mapper::DEFAULT_MAX_FRET;
use crate::fretboard::range::{PlayableRange, RangeError, DEFAULT_HIGH, DEFAULT_LOW};
use crate::fretboard::tuning::{Tuning, TuningError, STANDARD_TUNING};
use crate::groove::grid::Grid;
use crate::groove::quantize::QuantizeSettings;
use crate::pipeline::PipelineSettings;
use crate::state::storage::{default_data_dir, StorageError};

/// Resolution used when turning `min_duration` into an exact quarter-length
const MIN_DURATION_RESOLUTION: i64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid playable range: {0}")]
    Range(#[from] RangeError),

    #[error("invalid tuning: {0}")]
    Tuning(#[from] TuningError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    /// Grid subdivisions of the quarter note, in tie-break order
    pub divisors: Vec<u32>,

    /// Notes shorter than this many quarter notes are dropped
    pub min_duration: f64,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        QuantizeConfig {
            divisors: Grid::default().divisors,
            min_duration: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Open-string pitches, string 1 (highest) first
    pub tuning: [u8; 6],
    pub range_low: u8,
    pub range_high: u8,
    pub max_fret: u8,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            tuning: STANDARD_TUNING,
            range_low: DEFAULT_LOW,
            range_high: DEFAULT_HIGH,
            max_fret: DEFAULT_MAX_FRET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for the database, stored MIDI, and artifacts.
    /// Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Top-level configuration
///
/// ```toml
/// [quantize]
/// divisors = [4, 16]
/// min_duration = 0.1
///
/// [instrument]
/// tuning = [64, 59, 55, 50, 45, 40]
/// range_low = 40
/// range_high = 88
/// max_fret = 24
///
/// [output]
/// title = "Guitar Transcription"
///
/// [storage]
/// data_dir = "/var/lib/fretscribe"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FretscribeConfig {
    pub quantize: QuantizeConfig,
    pub instrument: InstrumentConfig,
    pub output: OutputConfig,
    pub storage: StorageConfig,
}

impl FretscribeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: FretscribeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from a file when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantize.divisors.is_empty() {
            return Err(ConfigError::Invalid("quantize.divisors must not be empty".to_string()));
        }
        if self.quantize.divisors.contains(&0) {
            return Err(ConfigError::Invalid("quantize.divisors must be positive".to_string()));
        }
        if !self.quantize.min_duration.is_finite() || self.quantize.min_duration < 0.0 {
            return Err(ConfigError::Invalid(
                "quantize.min_duration must be a non-negative number".to_string(),
            ));
        }

        PlayableRange::new(self.instrument.range_low, self.instrument.range_high)?;
        Tuning::new(self.instrument.tuning)?;
        if self.instrument.max_fret == 0 {
            return Err(ConfigError::Invalid("instrument.max_fret must be positive".to_string()));
        }

        if self.output.title.trim().is_empty() {
            return Err(ConfigError::Invalid("output.title must not be blank".to_string()));
        }

        Ok(())
    }

    /// Settings for the pure pipeline stages
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let min_duration = ql(
            (self.quantize.min_duration * MIN_DURATION_RESOLUTION as f64).round() as i64,
            MIN_DURATION_RESOLUTION,
        );

        Ok(PipelineSettings {
            quantize: QuantizeSettings {
                grid: Grid::new(self.quantize.divisors.clone()),
                min_duration,
            },
            range: PlayableRange::new(self.instrument.range_low, self.instrument.range_high)?,
            tuning: Tuning::new(self.instrument.tuning)?,
            max_fret: self.instrument.max_fret,
            title: self.output.title.clone(),
        })
    }

    /// Data root: the configured directory or the platform default
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(default_data_dir()?),
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_pipeline_defaults() {
        let config = FretscribeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pipeline_settings().unwrap(), PipelineSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = FretscribeConfig::from_toml(
            r#"
            [output]
            title = "Etude"

            [instrument]
            max_fret = 19
            "#,
        )
        .unwrap();

        assert_eq!(config.output.title, "Etude");
        assert_eq!(config.instrument.max_fret, 19);
        assert_eq!(config.instrument.tuning, STANDARD_TUNING);
        assert_eq!(config.quantize.divisors, vec![4, 16]);
    }

    #[test]
    fn test_min_duration_is_exact() {
        let config = FretscribeConfig::from_toml("[quantize]\nmin_duration = 0.25").unwrap();
        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.quantize.min_duration, ql(1, 4));
    }

    #[test]
    fn test_rejects_narrow_range() {
        let result = FretscribeConfig::from_toml("[instrument]\nrange_low = 60\nrange_high = 65");
        assert!(matches!(result, Err(ConfigError::Range(_))));
    }

    #[test]
    fn test_rejects_empty_divisors() {
        let result = FretscribeConfig::from_toml("[quantize]\ndivisors = []");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_types() {
        let result = FretscribeConfig::from_toml("[instrument]\nmax_fret = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file_and_render() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fretscribe.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/tmp/fretscribe-data\"\n").unwrap();

        let config = FretscribeConfig::load(&path).unwrap();
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/fretscribe-data"));

        let rendered = config.to_toml().unwrap();
        assert_eq!(FretscribeConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = FretscribeConfig::load(Path::new("/nonexistent/fretscribe.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
