use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};
use crate::outcome::Outcome;

/// Per-trial lifecycle as seen by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    #[default]
    PendingGeneration,
    AwaitingOutcome,
    OutcomeRecorded,
}

impl TrialState {
    pub fn ready_for_next_trial(&self) -> bool {
        !matches!(self, TrialState::AwaitingOutcome)
    }
}

/// Side of the subject's response: -1 left, 0 no-go, +1 right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum ResponseSide {
    Left,
    NoGo,
    Right,
}

impl ResponseSide {
    /// Response side implied by the outcome and the stimulus position.
    ///
    /// Returns `None` for a centred stimulus (`position == 0`) that was
    /// answered, which the protocol has to resolve itself.
    pub fn resolve(outcome: Outcome, position: f64) -> Option<ResponseSide> {
        match outcome {
            Outcome::NoGo => Some(ResponseSide::NoGo),
            Outcome::Correct if position < 0.0 => Some(ResponseSide::Right),
            Outcome::Error if position > 0.0 => Some(ResponseSide::Right),
            Outcome::Correct if position > 0.0 => Some(ResponseSide::Left),
            Outcome::Error if position < 0.0 => Some(ResponseSide::Left),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> i8 {
        match self {
            ResponseSide::Left => -1,
            ResponseSide::NoGo => 0,
            ResponseSide::Right => 1,
        }
    }
}

impl From<ResponseSide> for i8 {
    fn from(side: ResponseSide) -> i8 {
        side.as_i8()
    }
}

impl TryFrom<i8> for ResponseSide {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(ResponseSide::Left),
            0 => Ok(ResponseSide::NoGo),
            1 => Ok(ResponseSide::Right),
            other => Err(format!("response side must be -1, 0 or 1, got {other}")),
        }
    }
}

/// Outcome-stage values written back into a generated row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub outcome: Outcome,
    pub response_side: ResponseSide,
    pub response_time: Option<f64>,
    pub reward_amount: f64,
    pub reward_valve_time: f64,
}

/// One row of the trials table.
///
/// Generation fields are fixed when the row is appended; outcome fields
/// stay `None` until [`TrialRecord::apply_outcome`] runs, exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_num: usize,
    pub block_num: usize,
    pub block_trial_num: usize,
    pub contrast: f64,
    pub position: f64,
    pub quiescent_period: f64,
    pub stim_phase: f64,
    pub stim_angle: f64,
    pub stim_freq: f64,
    pub stim_sigma: f64,
    pub stim_gain: f64,
    pub stim_reverse: bool,
    pub stim_probability_left: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_phase: Option<u8>,
    #[serde(default)]
    pub debias_trial: bool,

    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub response_side: Option<ResponseSide>,
    #[serde(default)]
    pub reward_amount: Option<f64>,
    #[serde(default)]
    pub reward_valve_time: Option<f64>,
    #[serde(default)]
    pub trial_correct: Option<bool>,
}

impl TrialRecord {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }

    /// Contrast carrying the side of the stimulus; zero for centred stimuli.
    pub fn signed_contrast(&self) -> f64 {
        let signed = if self.position > 0.0 {
            self.contrast
        } else if self.position < 0.0 {
            -self.contrast
        } else {
            0.0
        };
        // fold -0.0 into 0.0 so grouping by value is stable
        if signed == 0.0 { 0.0 } else { signed }
    }

    /// Numeric view of a column, used to build flat renderer messages.
    pub fn numeric_field(&self, name: &str) -> Option<f64> {
        let value = match name {
            "trial_num" => self.trial_num as f64,
            "block_num" => self.block_num as f64,
            "block_trial_num" => self.block_trial_num as f64,
            "contrast" => self.contrast,
            "position" => self.position,
            "quiescent_period" => self.quiescent_period,
            "stim_phase" => self.stim_phase,
            "stim_angle" => self.stim_angle,
            "stim_freq" => self.stim_freq,
            "stim_sigma" => self.stim_sigma,
            "stim_gain" => self.stim_gain,
            "stim_reverse" => f64::from(u8::from(self.stim_reverse)),
            "stim_probability_left" => self.stim_probability_left,
            _ => return None,
        };
        Some(value)
    }

    pub fn apply_outcome(&mut self, result: &TrialOutcome) -> Result<()> {
        if self.is_complete() {
            return Err(TaskError::invariant(format!(
                "trial {} already has an outcome",
                self.trial_num
            )));
        }
        self.outcome = Some(result.outcome);
        self.trial_correct = Some(result.outcome == Outcome::Correct);
        self.response_side = Some(result.response_side);
        self.response_time = result.response_time;
        self.reward_amount = Some(result.reward_amount);
        self.reward_valve_time = Some(result.reward_valve_time);
        Ok(())
    }
}
