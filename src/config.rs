//! Attack and decomposition configuration
//!
//! Both configurations deserialize from JSON with every field optional;
//! missing fields take their [`Default`] values. Call `validate` (the
//! decomposition entry points do) before running anything.
use crate::error::{AttackError, Result};
use crate::AdvFloat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest trade-off constant the binary search will ever try.
pub const MAX_CONST: AdvFloat = 1e10;

/// Per-step learning rate of the inner optimisation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRateSchedule {
    Constant { rate: AdvFloat },
    /// `base_rate` divided by 1, 2, ..., `stages` over consecutive
    /// `steps / stages` long stretches of the run.
    Staircase { base_rate: AdvFloat, stages: usize },
}

impl Default for LearningRateSchedule {
    fn default() -> Self {
        Self::Staircase {
            base_rate: 5e-3,
            stages: 3,
        }
    }
}

impl LearningRateSchedule {
    pub fn rate(&self, step: usize, steps: usize) -> AdvFloat {
        match *self {
            Self::Constant { rate } => rate,
            Self::Staircase { base_rate, stages } => {
                // ceil((stages * step + 1) / steps)
                let divisor = ((stages * step + steps) / steps.max(1)).max(1);
                base_rate / divisor as AdvFloat
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let (rate, stages) = match *self {
            Self::Constant { rate } => (rate, 1),
            Self::Staircase { base_rate, stages } => (base_rate, stages),
        };
        if !(rate.is_finite() && rate > 0.) {
            return Err(invalid(format!("learning rate must be positive, got {}", rate)));
        }
        if stages == 0 {
            return Err(invalid("staircase schedule needs at least one stage"));
        }
        Ok(())
    }
}

/// Options of a single orthogonality-constrained Carlini-Wagner attack.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttackConfig {
    pub binary_search_steps: usize,
    pub initial_const: AdvFloat,
    /// Optimisation steps per binary search round.
    pub steps: usize,
    pub schedule: LearningRateSchedule,
    /// Logit margin required before a candidate counts as adversarial.
    pub confidence: AdvFloat,
    pub abort_early: bool,
    pub random_start: bool,
    /// Half-width of the uniform interval a random start is drawn from.
    pub random_start_radius: AdvFloat,
    pub seed: u64,
    /// Keep per-step loss values of the best round.
    pub record_loss: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            binary_search_steps: 9,
            initial_const: 1e-3,
            steps: 1000,
            schedule: LearningRateSchedule::default(),
            confidence: 0.,
            abort_early: true,
            random_start: false,
            random_start_radius: 0.1,
            seed: 0,
            record_loss: false,
        }
    }
}

impl AttackConfig {
    /// Settings for decomposing many images one at a time.
    pub fn sequential_preset() -> Self {
        Self {
            binary_search_steps: 10,
            initial_const: 1e-1,
            steps: 300,
            abort_early: true,
            ..Self::default()
        }
    }

    /// Settings for repeated, randomly started runs on a single image.
    pub fn single_image_preset() -> Self {
        Self {
            binary_search_steps: 9,
            initial_const: 1e-2,
            steps: 1000,
            confidence: 1.,
            abort_early: true,
            random_start: true,
            ..Self::default()
        }
    }

    /// # Errors
    /// Returns `AttackError::InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if self.binary_search_steps == 0 {
            return Err(invalid("binary_search_steps must be at least 1"));
        }
        if !(self.initial_const.is_finite() && self.initial_const > 0.) {
            return Err(invalid(format!(
                "initial_const must be positive and finite, got {}",
                self.initial_const
            )));
        }
        if self.steps == 0 {
            return Err(invalid("steps must be at least 1"));
        }
        if !(self.confidence.is_finite() && self.confidence >= 0.) {
            return Err(invalid(format!(
                "confidence must be non-negative, got {}",
                self.confidence
            )));
        }
        if !(self.random_start_radius.is_finite() && self.random_start_radius >= 0.) {
            return Err(invalid(format!(
                "random_start_radius must be non-negative, got {}",
                self.random_start_radius
            )));
        }
        self.schedule.validate()
    }

    /// # Errors
    /// On malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        from_json_str(json)
    }
}

/// Options of the direction accumulation loop.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub attack: AttackConfig,
    /// Maximum number of directions kept per sample.
    pub n_adv_dims: usize,
    /// Consecutive runs without any adversarial before giving up.
    pub early_stop: usize,
    /// Run limit of the batched loop.
    pub max_runs: usize,
    /// Weight of the orthogonality penalty relative to the trade-off constant.
    pub orth_const: AdvFloat,
    /// Perturbations shorter than this are not stored as directions.
    pub min_length: AdvFloat,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            attack: AttackConfig::default(),
            n_adv_dims: 3,
            early_stop: 3,
            max_runs: 100,
            orth_const: 1e5,
            min_length: 1e-6,
        }
    }
}

impl DecompositionConfig {
    /// # Errors
    /// Returns `AttackError::InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        self.attack.validate()?;
        if self.n_adv_dims == 0 {
            return Err(invalid("n_adv_dims must be at least 1"));
        }
        if self.early_stop == 0 {
            return Err(invalid("early_stop must be at least 1"));
        }
        if self.max_runs == 0 {
            return Err(invalid("max_runs must be at least 1"));
        }
        if !(self.orth_const.is_finite() && self.orth_const >= 0.) {
            return Err(invalid(format!(
                "orth_const must be non-negative, got {}",
                self.orth_const
            )));
        }
        if !(self.min_length.is_finite() && self.min_length >= 0.) {
            return Err(invalid(format!(
                "min_length must be non-negative, got {}",
                self.min_length
            )));
        }
        Ok(())
    }

    /// # Errors
    /// On malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        from_json_str(json)
    }

    /// # Errors
    /// If the file cannot be read or does not hold a valid configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = from_json_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }
}

fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

fn invalid<S: Into<String>>(msg: S) -> AttackError {
    AttackError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_staircase_decays_in_three_stages() {
        let schedule = LearningRateSchedule::default();
        let steps = 300;
        assert!((schedule.rate(0, steps) - 5e-3).abs() < 1e-15);
        assert!((schedule.rate(99, steps) - 5e-3).abs() < 1e-15);
        assert!((schedule.rate(100, steps) - 2.5e-3).abs() < 1e-15);
        assert!((schedule.rate(299, steps) - 5e-3 / 3.).abs() < 1e-15);
        let rates: Vec<_> = (0..steps).map(|s| schedule.rate(s, steps)).collect();
        assert!(rates.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = DecompositionConfig::from_json_str(
            r#"{"n_adv_dims": 30, "attack": {"steps": 300, "schedule": {"kind": "constant", "rate": 0.01}}}"#,
        )
        .unwrap();
        assert_eq!(config.n_adv_dims, 30);
        assert_eq!(config.early_stop, 3);
        assert_eq!(config.attack.steps, 300);
        assert_eq!(config.attack.binary_search_steps, 9);
        assert_eq!(
            config.attack.schedule,
            LearningRateSchedule::Constant { rate: 0.01 }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_options() {
        let mut config = DecompositionConfig::default();
        config.attack.initial_const = 0.;
        assert!(matches!(config.validate(), Err(AttackError::InvalidConfig(_))));

        let mut config = DecompositionConfig::default();
        config.attack.binary_search_steps = 0;
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.n_adv_dims = 0;
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.attack.confidence = -1.;
        assert!(config.validate().is_err());

        let mut config = DecompositionConfig::default();
        config.min_length = AdvFloat::NAN;
        assert!(config.validate().is_err());

        assert!(AttackConfig::sequential_preset().validate().is_ok());
        assert!(AttackConfig::single_image_preset().validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            DecompositionConfig::from_json_str("{\"n_adv_dims\": \"many\"}"),
            Err(AttackError::Json(_))
        ));
    }
}
