//! Run configuration, loadable from JSON.
//!
//! Every section falls back to its `Default` when omitted, so a file only
//! needs the values it changes:
//!
//! ```json
//! { "analysis": { "classify": { "area_d0": 120.0 } },
//!   "preprocess": { "method": "rolling_ball", "params": { "d0": 50, "d1": 50, "d2": 30 } } }
//! ```

use std::path::{Path, PathBuf};

use crate::analysis::ClassifyConfig;
use crate::matching::MatchConfig;
use crate::preprocess::{PreprocessConfig, PreprocessError};
use crate::segment::ThresholdConfig;
use crate::table::Frame;

/// Errors raised while loading or validating a run configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// An intensity threshold is NaN or infinite.
    NonFiniteThreshold { name: &'static str, value: f64 },
    /// An area threshold is negative or not finite.
    InvalidArea { name: &'static str, value: f64 },
    /// `required_frames` was given but lists no frame.
    EmptyRequiredFrames,
    /// The matching distance threshold is negative or not finite.
    InvalidMatchThreshold(f64),
    Preprocess(PreprocessError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Json { path, source } => write!(f, "{}: invalid config: {}", path.display(), source),
            Self::NonFiniteThreshold { name, value } => {
                write!(f, "intensity threshold {} must be finite, got {}", name, value)
            }
            Self::InvalidArea { name, value } => {
                write!(f, "{} must be a non-negative number, got {}", name, value)
            }
            Self::EmptyRequiredFrames => f.write_str("required_frames must not be empty when given"),
            Self::InvalidMatchThreshold(t) => write!(f, "matching distance threshold {} is invalid", t),
            Self::Preprocess(e) => write!(f, "preprocess: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Preprocess(e) => Some(e),
            _ => None,
        }
    }
}

/// Parameters of [`crate::pipeline::run_analysis`].
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub classify: ClassifyConfig,
    /// Frames every well must cover; defaults to the frames observed.
    pub required_frames: Option<Vec<Frame>>,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.classify.intensity;
        for (name, value) in [("d0", t.d0), ("d1", t.d1), ("d2", t.d2)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteThreshold { name, value });
            }
        }
        for (name, v) in [("area_d0", self.classify.area_d0), ("area_d1", self.classify.area_d1)] {
            if let Some(value) = v.filter(|v| !v.is_finite() || *v < 0.0) {
                return Err(ConfigError::InvalidArea { name, value });
            }
        }
        if self.required_frames.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::EmptyRequiredFrames);
        }
        Ok(())
    }
}

/// Every tunable of the pipeline in one document.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub segmentation: ThresholdConfig,
    pub analysis: AnalysisConfig,
    pub matching: MatchConfig,
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.preprocess.validate().map_err(ConfigError::Preprocess)?;
        self.analysis.validate()?;
        let t = self.matching.distance_threshold;
        if !t.is_finite() || t < 0.0 {
            return Err(ConfigError::InvalidMatchThreshold(t));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchMode;
    use crate::preprocess::BackgroundMethod;

    #[test]
    fn partial_json_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "analysis": { "classify": { "area_d0": 120.0 }, "required_frames": [0, 1, 2] },
                "preprocess": { "method": "rolling_ball", "params": { "d0": 50, "d1": 50, "d2": 30 } },
                "matching": { "mode": "transitive" }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.analysis.classify.area_d0, Some(120.0));
        assert_eq!(config.analysis.classify.area_d1, None);
        assert_eq!(config.analysis.classify.intensity.d2, 0.5);
        assert_eq!(config.analysis.required_frames, Some(vec![Frame(0), Frame(1), Frame(2)]));
        assert_eq!(config.preprocess.method, BackgroundMethod::RollingBall);
        assert_eq!(config.preprocess.params.d2, 30.0);
        assert_eq!(config.matching.mode, MatchMode::Transitive);
        assert_eq!(config.matching.distance_threshold, 50.0);
        assert_eq!(config.segmentation, ThresholdConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{ "matching": { "distance_threshold": -1.0 } }"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(ConfigError::InvalidMatchThreshold(t)) if t == -1.0
        ));

        let config = AnalysisConfig {
            required_frames: Some(Vec::new()),
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRequiredFrames)));
    }

    #[test]
    fn errors_name_their_cause() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(PipelineConfig::from_json_file(&missing), Err(ConfigError::Io { .. })));

        let broken = tmp.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let err = PipelineConfig::from_json_file(&broken).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().starts_with(&broken.display().to_string()));

        let mut config = PipelineConfig::default();
        config.analysis.classify.area_d1 = Some(-5.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidArea { name: "area_d1", .. })
        ));

        let mut config = PipelineConfig::default();
        config.analysis.classify.intensity.d0 = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteThreshold { name: "d0", .. })
        ));

        let mut config = PipelineConfig::default();
        config.preprocess.params.d1 = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Preprocess(_))));
    }
}
