use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

/// The three mutually exclusive ways a trial can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Error,
    NoGo,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Correct, Outcome::Error, Outcome::NoGo];

    /// Name of the state-machine state whose entry marks this outcome.
    pub fn marker(&self) -> &'static str {
        match self {
            Outcome::Correct => "correct",
            Outcome::Error => "error",
            Outcome::NoGo => "no_go",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.marker())
    }
}

/// Entry/exit pairs for every visit to one state. Unvisited states carry `null`s.
pub type StateVisits = Vec<Vec<Option<f64>>>;

/// Raw per-trial export of the hardware state machine.
///
/// Only `"States timestamps"` is interpreted; everything else the board
/// reports is kept verbatim so the durable log stays complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    #[serde(rename = "States timestamps", default)]
    pub states_timestamps: BTreeMap<String, StateVisits>,
    #[serde(
        rename = "Events timestamps",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub events_timestamps: BTreeMap<String, Vec<f64>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawOutcome {
    /// Parses a board export. Bare `NaN`/`Infinity` tokens, as written by
    /// Python's `json.dumps`, are read as `null`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(&null_non_finite(s))?)
    }

    /// Adds one visit of `state`. Pass `None` for a state that was never entered.
    pub fn with_state(mut self, state: &str, entry: Option<f64>, exit: Option<f64>) -> Self {
        self.states_timestamps
            .entry(state.to_string())
            .or_default()
            .push(vec![entry, exit]);
        self
    }

    /// First value of the first visit, if it is a finite number.
    pub fn first_timestamp(&self, state: &str) -> Option<f64> {
        self.states_timestamps
            .get(state)?
            .first()?
            .first()
            .copied()
            .flatten()
            .filter(|t| t.is_finite())
    }

    fn first_span(&self, state: &str) -> Option<(f64, f64)> {
        let visit = self.states_timestamps.get(state)?.first()?;
        match (visit.first().copied().flatten(), visit.get(1).copied().flatten()) {
            (Some(entry), Some(exit)) if entry.is_finite() && exit.is_finite() => {
                Some((entry, exit))
            }
            _ => None,
        }
    }

    /// Resolves the trial to exactly one outcome.
    pub fn classify(&self) -> Result<Outcome> {
        let reached: Vec<Outcome> = Outcome::ALL
            .into_iter()
            .filter(|o| self.first_timestamp(o.marker()).is_some())
            .collect();
        match reached.as_slice() {
            [outcome] => Ok(*outcome),
            [] => Err(TaskError::invariant(
                "trial reached none of the correct/error/no_go states",
            )),
            many => Err(TaskError::invariant(format!(
                "trial reached several outcome states: {many:?}"
            ))),
        }
    }

    /// Time from the opening of the response window to the subject's response.
    ///
    /// Uses the duration of the `closed_loop` state, falling back to the
    /// outcome marker onset relative to `closed_loop` or `stim_on` onset.
    pub fn response_time(&self, outcome: Outcome) -> Option<f64> {
        if let Some((entry, exit)) = self.first_span("closed_loop") {
            return Some(exit - entry);
        }
        let marker = self.first_timestamp(outcome.marker())?;
        let onset = self
            .first_timestamp("closed_loop")
            .or_else(|| self.first_timestamp("stim_on"))?;
        Some(marker - onset)
    }
}

const NON_FINITE_TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Replaces non-standard number tokens outside string literals with `null`.
fn null_non_finite(s: &str) -> Cow<'_, str> {
    if !NON_FINITE_TOKENS.iter().any(|t| s.contains(t)) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = rest.chars().next() {
        if !in_string {
            if let Some(token) = NON_FINITE_TOKENS.iter().find(|t| rest.starts_with(*t)) {
                out.push_str("null");
                rest = &rest[token.len()..];
                continue;
            }
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_only(reached: Outcome) -> RawOutcome {
        Outcome::ALL.iter().fold(RawOutcome::default(), |raw, o| {
            if *o == reached {
                raw.with_state(o.marker(), Some(2.0), Some(2.5))
            } else {
                raw.with_state(o.marker(), None, None)
            }
        })
    }

    #[test]
    fn classifies_single_marker() {
        for o in Outcome::ALL {
            assert_eq!(outcome_only(o).classify().unwrap(), o);
        }
    }

    #[test]
    fn rejects_missing_or_ambiguous_markers() {
        let none = RawOutcome::default()
            .with_state("correct", None, None)
            .with_state("error", None, None)
            .with_state("no_go", None, None);
        assert!(matches!(none.classify(), Err(TaskError::InvariantViolation(_))));

        let both = outcome_only(Outcome::Correct).with_state("error", Some(1.0), Some(1.2));
        // second visit of "error" does not count, only the first one does
        assert_eq!(both.classify().unwrap(), Outcome::Correct);

        let mut both = outcome_only(Outcome::Correct);
        both.states_timestamps
            .insert("error".into(), vec![vec![Some(1.0), Some(1.2)]]);
        assert!(matches!(both.classify(), Err(TaskError::InvariantViolation(_))));
    }

    #[test]
    fn parses_bpod_export_with_nulls() {
        let json = r#"{
            "States timestamps": {
                "closed_loop": [[1.5, 2.25]],
                "correct": [[2.25, 2.75]],
                "error": [[null, null]],
                "no_go": [[null, null]]
            },
            "Events timestamps": {"Port1In": [0.1]},
            "Trial start timestamp": 12.5
        }"#;
        let raw = RawOutcome::from_json_str(json).unwrap();
        assert_eq!(raw.classify().unwrap(), Outcome::Correct);
        assert_eq!(raw.response_time(Outcome::Correct), Some(0.75));
        assert!(raw.extra.contains_key("Trial start timestamp"));
    }

    #[test]
    fn parses_python_export_with_bare_nan() {
        let json = r#"{
            "States timestamps": {
                "closed_loop": [[1.5, 2.25]],
                "correct": [[NaN, NaN]],
                "error": [[2.25, 2.75]],
                "no_go": [[NaN, NaN]]
            },
            "Bpod start timestamp": -Infinity,
            "Note": "NaN stays text \"NaN\""
        }"#;
        let raw = RawOutcome::from_json_str(json).unwrap();
        assert_eq!(raw.classify().unwrap(), Outcome::Error);
        assert_eq!(raw.states_timestamps["no_go"], vec![vec![None, None]]);
        assert_eq!(raw.extra["Bpod start timestamp"], serde_json::Value::Null);
        assert_eq!(raw.extra["Note"], "NaN stays text \"NaN\"");
    }

    #[test]
    fn response_time_falls_back_to_stim_onset() {
        let raw = RawOutcome::default()
            .with_state("stim_on", Some(1.0), None)
            .with_state("error", Some(1.8), Some(2.0));
        let rt = raw.response_time(Outcome::Error).unwrap();
        assert!((rt - 0.8).abs() < 1e-12);
        assert_eq!(RawOutcome::default().response_time(Outcome::NoGo), None);
    }
}
