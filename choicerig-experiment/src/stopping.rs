use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why the session is advised to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Too few trials after the minimum session time.
    LongTimeLowTrials,
    /// Recent responses became much slower than the session median.
    Disengaged,
    /// The maximum session length is over.
    MaxDuration,
}

impl StopReason {
    pub fn code(&self) -> u8 {
        match self {
            StopReason::LongTimeLowTrials => 1,
            StopReason::Disengaged => 2,
            StopReason::MaxDuration => 3,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StopReason::LongTimeLowTrials => "too few trials performed in the allotted time",
            StopReason::Disengaged => "subject seems to be disengaged",
            StopReason::MaxDuration => "maximum session duration reached",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stopping criterion {}: {}", self.code(), self.message())
    }
}

/// Thresholds of the advisory stopping rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StoppingCriteria {
    pub enabled: bool,
    pub low_trials_minutes: f64,
    pub low_trials_count: usize,
    pub disengaged_window: usize,
    pub disengaged_min_trials: usize,
    pub disengaged_factor: f64,
    pub max_session_minutes: f64,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            low_trials_minutes: 45.0,
            low_trials_count: 400,
            disengaged_window: 20,
            disengaged_min_trials: 400,
            disengaged_factor: 5.0,
            max_session_minutes: 90.0,
        }
    }
}

impl StoppingCriteria {
    /// Evaluates the rules in order; the first one that matches wins.
    ///
    /// `response_times` is the session history, oldest first. Non-finite
    /// entries are ignored.
    pub fn should_stop(
        &self,
        elapsed: Duration,
        response_times: &[f64],
        trial_num: usize,
    ) -> Option<StopReason> {
        if !self.enabled {
            return None;
        }
        let minutes = elapsed.as_secs_f64() / 60.0;

        if minutes >= self.low_trials_minutes && trial_num <= self.low_trials_count {
            return Some(StopReason::LongTimeLowTrials);
        }

        let rts: Vec<f64> = response_times
            .iter()
            .copied()
            .filter(|rt| rt.is_finite())
            .collect();
        let window = self.disengaged_window.max(1);
        if rts.len() >= window && trial_num > self.disengaged_min_trials {
            if let (Some(latest), Some(all)) = (median(&rts[rts.len() - window..]), median(&rts)) {
                if latest > all * self.disengaged_factor {
                    return Some(StopReason::Disengaged);
                }
            }
        }

        if minutes >= self.max_session_minutes {
            return Some(StopReason::MaxDuration);
        }
        None
    }
}

/// Stop recommendation with the reference thresholds.
pub fn should_stop(elapsed: Duration, response_times: &[f64], trial_num: usize) -> Option<StopReason> {
    StoppingCriteria::default().should_stop(elapsed, response_times, trial_num)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
