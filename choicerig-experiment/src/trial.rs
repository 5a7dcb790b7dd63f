use std::collections::BTreeMap;

use choicerig_core::{ResponseSide, Result, TaskError, TrialRecord};
use serde::Serialize;

/// One signed-contrast level of the psychometric curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsychometricPoint {
    pub signed_contrast: f64,
    pub count: usize,
    /// Fraction of trials answered rightwards.
    pub fraction_right: f64,
    pub performance: f64,
    pub mean_response_time: Option<f64>,
}

/// Ordered trials of a session; row `i` has `trial_num == i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTable {
    rows: Vec<TrialRecord>,
}

impl TrialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a freshly generated row.
    ///
    /// The previous row must already carry its outcome and `trial_num`
    /// must continue the sequence.
    pub fn push(&mut self, record: TrialRecord) -> Result<&TrialRecord> {
        if record.trial_num != self.rows.len() {
            return Err(TaskError::invariant(format!(
                "trial {} appended at row {}",
                record.trial_num,
                self.rows.len()
            )));
        }
        if let Some(last) = self.rows.last() {
            if !last.is_complete() {
                return Err(TaskError::invariant(format!(
                    "trial {} still awaits its outcome",
                    last.trial_num
                )));
            }
        }
        self.rows.push(record);
        Ok(&self.rows[self.rows.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrialRecord] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrialRecord> {
        self.rows.iter()
    }

    pub fn get(&self, trial_num: usize) -> Option<&TrialRecord> {
        self.rows.get(trial_num)
    }

    /// The latest row, complete or not.
    pub fn current(&self) -> Option<&TrialRecord> {
        self.rows.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut TrialRecord> {
        self.rows.last_mut()
    }

    pub fn last_completed(&self) -> Option<&TrialRecord> {
        self.rows.iter().rev().find(|r| r.is_complete())
    }

    pub fn completed(&self) -> impl Iterator<Item = &TrialRecord> {
        self.rows.iter().filter(|r| r.is_complete())
    }

    /// Response times of completed trials, oldest first.
    pub fn response_times(&self) -> Vec<f64> {
        self.completed().filter_map(|r| r.response_time).collect()
    }

    /// Fraction of completed trials answered on `side`; 0.5 before any trial.
    pub fn fraction_responded(&self, side: ResponseSide) -> f64 {
        let sides: Vec<ResponseSide> = self.completed().filter_map(|r| r.response_side).collect();
        if sides.is_empty() {
            return 0.5;
        }
        sides.iter().filter(|s| **s == side).count() as f64 / sides.len() as f64
    }

    /// Drops a trailing row that never received its outcome.
    pub fn into_completed(mut self) -> Vec<TrialRecord> {
        if self.rows.last().is_some_and(|r| !r.is_complete()) {
            self.rows.pop();
        }
        self.rows
    }

    /// Completed trials grouped by signed contrast, left to right.
    pub fn psychometric_curve(&self) -> Vec<PsychometricPoint> {
        #[derive(Default)]
        struct Acc {
            count: usize,
            right: usize,
            correct: usize,
            rt_sum: f64,
            rt_count: usize,
        }

        // f64 is not Ord; key on micro-contrast units
        let mut groups: BTreeMap<i64, (f64, Acc)> = BTreeMap::new();
        for r in self.completed() {
            let signed = r.signed_contrast();
            let key = (signed * 1e6).round() as i64;
            let (_, acc) = groups.entry(key).or_insert_with(|| (signed, Acc::default()));
            acc.count += 1;
            if r.response_side == Some(ResponseSide::Right) {
                acc.right += 1;
            }
            if r.trial_correct == Some(true) {
                acc.correct += 1;
            }
            if let Some(rt) = r.response_time {
                acc.rt_sum += rt;
                acc.rt_count += 1;
            }
        }

        groups
            .into_values()
            .map(|(signed_contrast, acc)| PsychometricPoint {
                signed_contrast,
                count: acc.count,
                fraction_right: acc.right as f64 / acc.count as f64,
                performance: acc.correct as f64 / acc.count as f64,
                mean_response_time: (acc.rt_count > 0).then(|| acc.rt_sum / acc.rt_count as f64),
            })
            .collect()
    }
}
