use std::collections::BTreeMap;

use serde::Serialize;

use crate::trial::TrialRecord;

/// Trial columns the stimulus renderer understands.
pub const RENDERER_FIELDS: &[&str] = &[
    "trial_num",
    "position",
    "contrast",
    "quiescent_period",
    "stim_phase",
    "stim_angle",
    "stim_freq",
    "stim_sigma",
    "stim_gain",
    "stim_reverse",
];

/// Flat key/value message sent to the renderer once per trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StimulusMessage(BTreeMap<&'static str, f64>);

impl StimulusMessage {
    /// Keeps the allow-listed columns of `record`; unknown names are skipped.
    pub fn from_record(record: &TrialRecord, allow: &[&'static str]) -> Self {
        Self(
            allow
                .iter()
                .filter_map(|&name| record.numeric_field(name).map(|v| (name, v)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}
