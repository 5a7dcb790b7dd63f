use choicerig_core::{Result, TaskError};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

/// Floor and ceiling of the per-trial reward volume, in µl.
pub const REWARD_VOLUME_RANGE_UL: (f64, f64) = (1.5, 3.0);
const REWARD_VOLUME_STEP_UL: f64 = 0.1;
const ADAPTIVE_REWARD_MIN_TRIALS: usize = 200;
/// Daily water requirement: 1 ml per 25 g of body weight.
const GRAMS_PER_ML: f64 = 25.0;

/// How the volume of a correct trial's reward is chosen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardSchedule {
    /// Always `REWARD_AMOUNT`.
    #[default]
    Constant,
    /// One of `amounts`, drawn with the matching `probabilities`.
    Choice {
        amounts: Vec<f64>,
        probabilities: Vec<f64>,
    },
}

impl RewardSchedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            RewardSchedule::Constant => Ok(()),
            RewardSchedule::Choice {
                amounts,
                probabilities,
            } => {
                if amounts.is_empty() || amounts.len() != probabilities.len() {
                    return Err(TaskError::config(
                        "reward schedule needs one probability per amount",
                    ));
                }
                if amounts.iter().any(|a| !a.is_finite() || *a < 0.0) {
                    return Err(TaskError::config("reward amounts must be finite and >= 0"));
                }
                WeightedIndex::new(probabilities)
                    .map(|_| ())
                    .map_err(|e| TaskError::config(format!("reward probabilities: {e}")))
            }
        }
    }
}

/// Draws the reward volume of one correct trial.
pub fn draw_reward_amount<R: Rng + ?Sized>(
    schedule: &RewardSchedule,
    base_amount: f64,
    rng: &mut R,
) -> Result<f64> {
    match schedule {
        RewardSchedule::Constant => Ok(base_amount),
        RewardSchedule::Choice {
            amounts,
            probabilities,
        } => {
            let dist = WeightedIndex::new(probabilities)
                .map_err(|e| TaskError::invalid(format!("reward probabilities: {e}")))?;
            Ok(amounts[dist.sample(rng)])
        }
    }
}

/// Reward volume for the next session given how the previous one went.
///
/// A subject that drank less than its daily requirement gets 0.1 µl more
/// per reward; one that did more than 200 trials gets 0.1 µl less. The
/// result is clamped to [`REWARD_VOLUME_RANGE_UL`].
pub fn compute_adaptive_reward_volume(
    subject_weight_g: f64,
    reward_volume_ul: f64,
    delivered_volume_ul: f64,
    ntrials: usize,
) -> f64 {
    let mut volume = reward_volume_ul;
    if subject_weight_g > delivered_volume_ul / 1000.0 * GRAMS_PER_ML {
        volume += REWARD_VOLUME_STEP_UL;
    } else if ntrials > ADAPTIVE_REWARD_MIN_TRIALS {
        volume -= REWARD_VOLUME_STEP_UL;
    }
    let (lo, hi) = REWARD_VOLUME_RANGE_UL;
    // keep one decimal so repeated adjustments do not drift
    ((volume.clamp(lo, hi)) * 10.0).round() / 10.0
}
