use choicerig_core::Outcome;
use serde::Serialize;

/// Running session counts, updated once per recorded outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionAggregates {
    pub ntrials: usize,
    pub ntrials_correct: usize,
    pub ntrials_no_go: usize,
    /// Cumulative reward volume, µl.
    pub water_delivered: f64,
}

impl SessionAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, outcome: Outcome, reward_amount: f64) {
        self.ntrials += 1;
        match outcome {
            Outcome::Correct => self.ntrials_correct += 1,
            Outcome::NoGo => self.ntrials_no_go += 1,
            Outcome::Error => {}
        }
        self.water_delivered += reward_amount;
    }

    /// Trials that were not correct, no-go included.
    pub fn ntrials_error(&self) -> usize {
        self.ntrials - self.ntrials_correct
    }

    pub fn performance(&self) -> f64 {
        if self.ntrials == 0 {
            0.0
        } else {
            self.ntrials_correct as f64 / self.ntrials as f64
        }
    }
}
