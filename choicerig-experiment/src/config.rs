use std::path::Path;
use std::str::FromStr;

use choicerig_core::{Result, TaskError};
use serde::{Deserialize, Serialize};

use crate::reward::RewardSchedule;
use crate::stopping::StoppingCriteria;

/// How contrasts are drawn from `CONTRAST_SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrastProbabilityType {
    /// One contrast (the last by default) is down-weighted relative to the others.
    #[default]
    #[serde(alias = "skew_zero")]
    Biased,
    Uniform,
}

impl FromStr for ContrastProbabilityType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "biased" | "skew_zero" => Ok(ContrastProbabilityType::Biased),
            "uniform" => Ok(ContrastProbabilityType::Uniform),
            other => Err(TaskError::invalid(format!(
                "unsupported contrast probability type '{other}', use 'skew_zero', 'biased' or 'uniform'"
            ))),
        }
    }
}

/// Read-only task configuration for one session.
///
/// Keys follow the rig's settings files (`BLOCK_LEN_FACTOR`, ...); any key
/// missing from a file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TaskParameters {
    pub ntrials: usize,

    pub block_init_5050: bool,
    pub block_len_factor: f64,
    pub block_len_min: f64,
    pub block_len_max: f64,
    pub block_probability_set: Vec<f64>,
    /// Side probability of the protocols without blocks.
    pub probability_left: f64,

    pub contrast_set: Vec<f64>,
    pub contrast_set_probability_type: ContrastProbabilityType,
    pub stim_positions: [f64; 2],

    pub quiescent_period: f64,
    pub quiescent_texp_factor: f64,
    pub quiescent_texp_min: f64,
    pub quiescent_texp_max: f64,

    pub stim_angle: f64,
    pub stim_freq: f64,
    pub stim_sigma: f64,
    pub stim_gain: f64,
    /// Gain for subjects still learning the wheel (few correct trials last session).
    pub ag_init_value: f64,
    pub stim_reverse: bool,

    pub reward_amount: f64,
    pub reward_schedule: RewardSchedule,

    pub training_phase: u8,
    pub debias: bool,

    #[serde(rename = "STOPPING_CRITERIA")]
    pub stopping: StoppingCriteria,
}

impl Default for TaskParameters {
    fn default() -> Self {
        Self {
            ntrials: 2000,
            block_init_5050: true,
            block_len_factor: 60.0,
            block_len_min: 20.0,
            block_len_max: 100.0,
            block_probability_set: vec![0.2, 0.8],
            probability_left: 0.5,
            contrast_set: vec![1.0, 0.25, 0.125, 0.0625, 0.0],
            contrast_set_probability_type: ContrastProbabilityType::Biased,
            stim_positions: [-35.0, 35.0],
            quiescent_period: 0.2,
            quiescent_texp_factor: 0.35,
            quiescent_texp_min: 0.2,
            quiescent_texp_max: 0.5,
            stim_angle: 0.0,
            stim_freq: 0.1,
            stim_sigma: 7.0,
            stim_gain: 4.0,
            ag_init_value: 8.0,
            stim_reverse: false,
            reward_amount: 1.5,
            reward_schedule: RewardSchedule::Constant,
            training_phase: 0,
            debias: true,
            stopping: StoppingCriteria::default(),
        }
    }
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

impl TaskParameters {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let params: TaskParameters = serde_json::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|e| TaskError::config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.block_len_factor.is_finite() && self.block_len_factor > 0.0) {
            return Err(TaskError::config("BLOCK_LEN_FACTOR must be positive"));
        }
        if !(self.block_len_min.is_finite() && self.block_len_max.is_finite())
            || self.block_len_min < 1.0
            || self.block_len_min > self.block_len_max
        {
            return Err(TaskError::config(
                "BLOCK_LEN_MIN must be >= 1 and not above BLOCK_LEN_MAX",
            ));
        }
        if self.block_probability_set.is_empty()
            || !self.block_probability_set.iter().copied().all(is_probability)
        {
            return Err(TaskError::config(
                "BLOCK_PROBABILITY_SET must be a non-empty list of probabilities",
            ));
        }
        if !is_probability(self.probability_left) {
            return Err(TaskError::config("PROBABILITY_LEFT must be within [0, 1]"));
        }
        if self.contrast_set.is_empty() || !self.contrast_set.iter().copied().all(is_probability)
        {
            return Err(TaskError::config(
                "CONTRAST_SET must be a non-empty list of contrasts within [0, 1]",
            ));
        }
        if !self.stim_positions.iter().all(|p| p.is_finite()) {
            return Err(TaskError::config("STIM_POSITIONS must be finite"));
        }
        if !(self.quiescent_period.is_finite() && self.quiescent_period >= 0.0) {
            return Err(TaskError::config("QUIESCENT_PERIOD must be >= 0"));
        }
        if !(self.quiescent_texp_factor > 0.0
            && self.quiescent_texp_min <= self.quiescent_texp_max)
        {
            return Err(TaskError::config(
                "quiescent period exponential needs a positive factor and min <= max",
            ));
        }
        if !(self.reward_amount.is_finite() && self.reward_amount >= 0.0) {
            return Err(TaskError::config("REWARD_AMOUNT must be >= 0"));
        }
        self.reward_schedule.validate()?;
        if self.training_phase > crate::protocol::MAX_TRAINING_PHASE {
            return Err(TaskError::config(format!(
                "TRAINING_PHASE must be within 0..={}",
                crate::protocol::MAX_TRAINING_PHASE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TaskParameters::default().validate().unwrap();
    }

    #[test]
    fn partial_settings_keep_defaults() {
        let params = TaskParameters::from_json_str(
            r#"{
                "BLOCK_INIT_5050": false,
                "BLOCK_PROBABILITY_SET": [0.1, 0.9],
                "CONTRAST_SET_PROBABILITY_TYPE": "skew_zero",
                "REWARD_SCHEDULE": {"type": "choice", "amounts": [1, 3], "probabilities": [0.6, 0.4]},
                "STOPPING_CRITERIA": {"MAX_SESSION_MINUTES": 60},
                "SUBJECT_WEIGHT": 21.3
            }"#,
        )
        .unwrap();
        assert!(!params.block_init_5050);
        assert_eq!(params.block_probability_set, vec![0.1, 0.9]);
        assert_eq!(params.contrast_set_probability_type, ContrastProbabilityType::Biased);
        assert_eq!(params.block_len_factor, 60.0);
        assert_eq!(params.stopping.max_session_minutes, 60.0);
        assert_eq!(params.stopping.low_trials_count, 400);
        assert!(matches!(params.reward_schedule, RewardSchedule::Choice { .. }));
        assert_eq!(params.ag_init_value, 8.0);
    }

    #[test]
    fn rejects_inverted_block_bounds() {
        let err = TaskParameters::from_json_str(r#"{"BLOCK_LEN_MIN": 100, "BLOCK_LEN_MAX": 20}"#)
            .unwrap_err();
        assert!(matches!(err, TaskError::Config(_)));
    }

    #[test]
    fn rejects_three_positions() {
        assert!(TaskParameters::from_json_str(r#"{"STIM_POSITIONS": [-35, 0, 35]}"#).is_err());
    }

    #[test]
    fn probability_type_names() {
        assert_eq!(
            "skew_zero".parse::<ContrastProbabilityType>().unwrap(),
            ContrastProbabilityType::Biased
        );
        assert_eq!(
            "uniform".parse::<ContrastProbabilityType>().unwrap(),
            ContrastProbabilityType::Uniform
        );
        assert!(matches!(
            "gaussian".parse::<ContrastProbabilityType>(),
            Err(TaskError::InvalidArgument(_))
        ));
    }
}
