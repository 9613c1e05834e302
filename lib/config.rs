//! JSON configuration of a simulated RB experiment.
//!
//! Every section is optional; anything missing takes its default value.
//!
//! ```json
//! {
//!   "sweep": { "start": 1, "step": 20, "expts": 8, "variations": 10,
//!              "loops": 2, "reps": 1000, "calib_reps": 10000,
//!              "interleave": "X/2" },
//!   "roles": { "drive": 1, "passive": 0, "leakage": 1 },
//!   "device": { "depolarizing": 0.005, "leakage": 0.0005,
//!               "readout_error": 0.02, "shelved_readout_error": 0.05,
//!               "seed": 10546 },
//!   "analysis": { "fix_negatives": true },
//!   "seed": 1234
//! }
//! ```

use std::path::Path;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use crate::{
    ErrorKind,
    experiment::{ ExperimentError, QubitRoles, RbSweep },
    sim::{ SimConfig, SimError },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when the sweep or qubit roles fail validation.
    #[error("invalid experiment configuration: {0}")]
    Experiment(#[from] ExperimentError),

    /// Returned when the device section fails validation.
    #[error("invalid device configuration: {0}")]
    Device(#[from] SimError),
}
use ConfigError::*;
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Return the broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Experiment(err) => err.kind(),
            Device(err) => err.kind(),
            _ => ErrorKind::InvalidArgument,
        }
    }
}

/// Post-processing options.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Repair negative counts after readout correction.
    pub fix_negatives: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self { Self { fix_negatives: true } }
}

fn default_seed() -> u64 { 10546 }

/// Top-level experiment configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub sweep: RbSweep,

    #[serde(default)]
    pub roles: QubitRoles,

    /// Simulated device noise.
    #[serde(default)]
    pub device: SimConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Seed for sequence generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sweep: RbSweep::default(),
            roles: QubitRoles::default(),
            device: SimConfig::default(),
            analysis: AnalysisConfig::default(),
            seed: default_seed(),
        }
    }
}

impl ExperimentConfig {
    /// Load from a JSON file, or use the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config: Self =
            match path {
                Some(p) => {
                    let content = std::fs::read_to_string(p)?;
                    Self::from_json(&content)?
                },
                None => Self::default(),
            };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string without validating.
    pub fn from_json(s: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.sweep.validate()?;
        self.roles.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config =
            ExperimentConfig::from_json(r#"{ "sweep": { "expts": 3 }, "seed": 7 }"#)
            .unwrap();
        assert_eq!(config.sweep.expts, 3);
        assert_eq!(config.sweep.reps, RbSweep::default().reps);
        assert_eq!(config.roles, QubitRoles::default());
        assert_eq!(config.seed, 7);
        assert!(config.analysis.fix_negatives);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_object_is_default() {
        let config = ExperimentConfig::from_json("{}").unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn invalid_sections() {
        let config =
            ExperimentConfig::from_json(r#"{ "roles": { "drive": 0, "passive": 0 } }"#)
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Experiment(ExperimentError::InvalidRoles(_))));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(std::error::Error::source(&err).is_some());

        let config =
            ExperimentConfig::from_json(r#"{ "device": { "leakage": 2.0 } }"#)
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(Device(SimError::BadProbability { name: "leakage", .. })),
        ));

        let config =
            ExperimentConfig::from_json(
                r#"{ "sweep": { "interleave": "X/3" } }"#)
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Experiment(ExperimentError::Clifford(_))));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(matches!(ExperimentConfig::from_json("{ seed: }"), Err(Json(_))));
        assert!(matches!(
            ExperimentConfig::load(Some(Path::new("/nonexistent/rb.json"))),
            Err(Io(_)),
        ));
    }
}
