//! Simulated subject standing in for the rig's state machine.
//!
//! Produces the same per-trial export the hardware would, so a session can
//! be exercised end to end without a rig.

use std::time::Duration;

use choicerig_core::{Outcome, RawOutcome, Result, TaskError, TrialRecord};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

const TRIAL_START_S: f64 = 1e-4;
const STIM_ON_S: f64 = 0.1;
const FEEDBACK_CORRECT_S: f64 = 1.0;
const FEEDBACK_ERROR_S: f64 = 2.0;
const ITI_S: f64 = 0.5;

/// Logistic psychometric observer with lapses, no-gos and a pull towards
/// the block prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSubject {
    /// Contrast scale of the logistic; smaller is sharper.
    pub sensitivity: f64,
    /// Rate of random choices regardless of the stimulus.
    pub lapse: f64,
    /// Probability of not responding at all.
    pub no_go_rate: f64,
    /// How strongly the block bias shifts choices.
    pub prior_weight: f64,
    /// Shortest response time, seconds.
    pub min_response_time: f64,
    /// Mean of the exponential part of the response time, seconds.
    pub mean_response_time: f64,
    /// Length of the response window a no-go trial waits out, seconds.
    pub response_window: f64,
}

impl Default for SimulatedSubject {
    fn default() -> Self {
        Self {
            sensitivity: 0.08,
            lapse: 0.1,
            no_go_rate: 0.02,
            prior_weight: 0.3,
            min_response_time: 0.15,
            mean_response_time: 0.6,
            response_window: 60.0,
        }
    }
}

/// One simulated trial: the hardware export and how long it took.
#[derive(Debug, Clone)]
pub struct SimulatedTrial {
    pub raw: RawOutcome,
    pub duration: Duration,
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl SimulatedSubject {
    /// Probability of answering `record` correctly.
    pub fn p_correct(&self, record: &TrialRecord) -> f64 {
        // prior towards the side the stimulus is on
        let prior = if record.position < 0.0 {
            record.stim_probability_left - 0.5
        } else {
            0.5 - record.stim_probability_left
        };
        let evidence = record.contrast / self.sensitivity + self.prior_weight * prior * 10.0;
        self.lapse / 2.0 + (1.0 - self.lapse) * logistic(evidence)
    }

    pub fn perform<R: Rng + ?Sized>(
        &self,
        record: &TrialRecord,
        rng: &mut R,
    ) -> Result<SimulatedTrial> {
        let outcome = if rng.random_bool(self.no_go_rate.clamp(0.0, 1.0)) {
            Outcome::NoGo
        } else if rng.random_bool(self.p_correct(record).clamp(0.0, 1.0)) {
            Outcome::Correct
        } else {
            Outcome::Error
        };

        let response_time = match outcome {
            Outcome::NoGo => self.response_window,
            _ => {
                let exp = Exp::new(1.0 / self.mean_response_time)
                    .map_err(|e| TaskError::invalid(e.to_string()))?;
                (self.min_response_time + exp.sample(rng)).min(self.response_window)
            }
        };

        let quiescence_end = TRIAL_START_S + record.quiescent_period;
        let stim_end = quiescence_end + STIM_ON_S;
        let response_end = stim_end + response_time;
        let feedback = match outcome {
            Outcome::Correct => FEEDBACK_CORRECT_S,
            _ => FEEDBACK_ERROR_S,
        };
        let trial_end = response_end + feedback;

        let raw = Outcome::ALL.iter().fold(
            RawOutcome::default()
                .with_state("trial_start", Some(0.0), Some(TRIAL_START_S))
                .with_state("quiescent_period", Some(TRIAL_START_S), Some(quiescence_end))
                .with_state("stim_on", Some(quiescence_end), Some(stim_end))
                .with_state("closed_loop", Some(stim_end), Some(response_end)),
            |raw, o| {
                if *o == outcome {
                    raw.with_state(o.marker(), Some(response_end), Some(trial_end))
                } else {
                    raw.with_state(o.marker(), None, None)
                }
            },
        );

        Ok(SimulatedTrial {
            raw,
            duration: Duration::from_secs_f64(trial_end + ITI_S),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record(position: f64, contrast: f64, p_left: f64) -> TrialRecord {
        TrialRecord {
            trial_num: 0,
            block_num: 0,
            block_trial_num: 0,
            contrast,
            position,
            quiescent_period: 0.5,
            stim_phase: 0.0,
            stim_angle: 0.0,
            stim_freq: 0.1,
            stim_sigma: 7.0,
            stim_gain: 4.0,
            stim_reverse: false,
            stim_probability_left: p_left,
            training_phase: None,
            debias_trial: false,
            outcome: None,
            response_time: None,
            response_side: None,
            reward_amount: None,
            reward_valve_time: None,
            trial_correct: None,
        }
    }

    #[test]
    fn easy_trials_are_mostly_correct() {
        let subject = SimulatedSubject::default();
        assert!(subject.p_correct(&record(-35.0, 1.0, 0.5)) > 0.9);
        let zero = subject.p_correct(&record(-35.0, 0.0, 0.5));
        assert!((zero - 0.5).abs() < 1e-12);
        assert!(subject.p_correct(&record(-35.0, 0.0, 0.8)) > 0.5);
        assert!(subject.p_correct(&record(35.0, 0.0, 0.8)) < 0.5);
    }

    #[test]
    fn export_resolves_to_one_outcome() {
        let subject = SimulatedSubject::default();
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..200 {
            let trial = subject.perform(&record(35.0, 0.25, 0.5), &mut rng).unwrap();
            let outcome = trial.raw.classify().unwrap();
            let rt = trial.raw.response_time(outcome).unwrap();
            assert!(rt >= subject.min_response_time - 1e-9);
            assert!(trial.duration.as_secs_f64() > rt);
        }
    }
}
