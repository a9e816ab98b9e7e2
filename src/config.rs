//! Agent hyperparameters.
//!
//! Every value is optional; missing keys fall back to the defaults below.
//! Configurations can come from a key/value map ([`DqnOption`] keys), from
//! JSON, or be built directly in Rust.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReinforceError, Result};

/// Named hyperparameter keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DqnOption {
    Gamma,
    Epsilon,
    Alpha,
    ExperienceAddEvery,
    ExperienceSize,
    LearningStepsPerIteration,
    TdErrorClamp,
    NumHiddenUnits,
    SaveInterval,
}

impl DqnOption {
    pub const ALL: [DqnOption; 9] = [
        DqnOption::Gamma,
        DqnOption::Epsilon,
        DqnOption::Alpha,
        DqnOption::ExperienceAddEvery,
        DqnOption::ExperienceSize,
        DqnOption::LearningStepsPerIteration,
        DqnOption::TdErrorClamp,
        DqnOption::NumHiddenUnits,
        DqnOption::SaveInterval,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DqnOption::Gamma => "gamma",
            DqnOption::Epsilon => "epsilon",
            DqnOption::Alpha => "alpha",
            DqnOption::ExperienceAddEvery => "experienceAddEvery",
            DqnOption::ExperienceSize => "experienceSize",
            DqnOption::LearningStepsPerIteration => "learningStepsPerIteration",
            DqnOption::TdErrorClamp => "tdErrorClamp",
            DqnOption::NumHiddenUnits => "numHiddenUnits",
            DqnOption::SaveInterval => "saveInterval",
        }
    }
}

impl fmt::Display for DqnOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DqnOption {
    type Err = ReinforceError;

    fn from_str(s: &str) -> Result<Self> {
        DqnOption::ALL
            .iter()
            .copied()
            .find(|opt| opt.key() == s)
            .ok_or_else(|| ReinforceError::invalid_parameter(s, "unknown hyperparameter key"))
    }
}

/// Hyperparameters of a [`DqnAgent`](crate::agent::DqnAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DqnConfig {
    /// Discount factor
    pub gamma: f64,
    /// Probability of a uniformly random action
    pub epsilon: f64,
    /// SGD step size; 0 turns learning off
    pub alpha: f64,
    /// Store a transition in the replay ring every this many trained steps
    pub experience_add_every: usize,
    /// Replay ring capacity
    pub experience_size: usize,
    /// Replayed updates per `learn` call
    pub learning_steps_per_iteration: usize,
    /// Bound on the magnitude of the TD error fed to backward
    pub td_error_clamp: f64,
    pub num_hidden_units: usize,
    /// Trained steps between periodic saves, -1 disables
    pub save_interval: i64,
}

impl Default for DqnConfig {
    fn default() -> Self {
        DqnConfig {
            gamma: 0.3,
            epsilon: 0.01,
            alpha: 0.05,
            experience_add_every: 25,
            experience_size: 5000,
            learning_steps_per_iteration: 10,
            td_error_clamp: 1.0,
            num_hidden_units: 100,
            save_interval: 100,
        }
    }
}

impl DqnConfig {
    /// Build from named numeric values; counts are rounded to the nearest integer.
    pub fn from_options(options: &HashMap<DqnOption, f64>) -> Result<Self> {
        let mut config = DqnConfig::default();
        for (&option, &value) in options {
            config.set(option, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Same as [`from_options`](Self::from_options) with string keys.
    pub fn from_named(options: &HashMap<String, f64>) -> Result<Self> {
        let parsed = options
            .iter()
            .map(|(k, &v)| k.parse::<DqnOption>().map(|opt| (opt, v)))
            .collect::<Result<HashMap<_, _>>>()?;
        Self::from_options(&parsed)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DqnConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn set(&mut self, option: DqnOption, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(ReinforceError::invalid_parameter(option.key(), "must be finite"));
        }
        match option {
            DqnOption::Gamma => self.gamma = value,
            DqnOption::Epsilon => self.epsilon = value,
            DqnOption::Alpha => self.alpha = value,
            DqnOption::ExperienceAddEvery => self.experience_add_every = to_count(option, value)?,
            DqnOption::ExperienceSize => self.experience_size = to_count(option, value)?,
            DqnOption::LearningStepsPerIteration => {
                self.learning_steps_per_iteration = to_count(option, value)?
            }
            DqnOption::TdErrorClamp => self.td_error_clamp = value,
            DqnOption::NumHiddenUnits => self.num_hidden_units = to_count(option, value)?,
            DqnOption::SaveInterval => self.save_interval = value.round() as i64,
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ReinforceError::invalid_parameter("gamma", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ReinforceError::invalid_parameter("epsilon", "must be in [0, 1]"));
        }
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(ReinforceError::invalid_parameter("alpha", "must be >= 0"));
        }
        if self.experience_add_every == 0 {
            return Err(ReinforceError::invalid_parameter("experienceAddEvery", "must be > 0"));
        }
        if self.experience_size == 0 {
            return Err(ReinforceError::invalid_parameter("experienceSize", "must be > 0"));
        }
        if !(self.td_error_clamp > 0.0) {
            return Err(ReinforceError::invalid_parameter("tdErrorClamp", "must be > 0"));
        }
        if self.num_hidden_units == 0 {
            return Err(ReinforceError::invalid_parameter("numHiddenUnits", "must be > 0"));
        }
        if self.save_interval == 0 || self.save_interval < -1 {
            return Err(ReinforceError::invalid_parameter(
                "saveInterval",
                "must be > 0, or -1 to disable",
            ));
        }
        Ok(())
    }

    /// Periodic save interval, `None` when disabled.
    pub fn save_every(&self) -> Option<usize> {
        usize::try_from(self.save_interval).ok().filter(|&n| n > 0)
    }
}

fn to_count(option: DqnOption, value: f64) -> Result<usize> {
    let rounded = value.round();
    if rounded < 0.0 {
        return Err(ReinforceError::invalid_parameter(option.key(), "must not be negative"));
    }
    Ok(rounded as usize)
}
