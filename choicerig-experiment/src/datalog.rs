use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use choicerig_core::{RawOutcome, Result, TaskError, TrialRecord};
use serde::Serialize;
use serde_json::Value;

use crate::config::TaskParameters;

/// One durable log line: the completed trial row plus the raw hardware export.
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    #[serde(flatten)]
    pub record: &'a TrialRecord,
    pub behavior_data: &'a RawOutcome,
}

/// Append-only trial log. A failed append is fatal to the session.
pub trait TrialLog {
    fn append(&mut self, entry: &LogEntry<'_>) -> Result<()>;
}

/// JSON-lines file, flushed after every trial.
#[derive(Debug)]
pub struct JsonlTrialLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlTrialLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrialLog for JsonlTrialLog {
    fn append(&mut self, entry: &LogEntry<'_>) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory log; clones share the same lines.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrialLog {
    lines: Arc<Mutex<Vec<Value>>>,
}

impl MemoryTrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Value> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TrialLog for MemoryTrialLog {
    fn append(&mut self, entry: &LogEntry<'_>) -> Result<()> {
        let value = serde_json::to_value(entry)?;
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        Ok(())
    }
}

/// Reads back the trial rows of a JSON-lines log. Blank lines are skipped.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<TrialRecord>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TrialRecord = serde_json::from_str(&line).map_err(|e| {
            TaskError::config(format!("{}:{}: {e}", path.display(), line_num + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Previous session at or below this many correct trials keeps the initial gain.
pub const ADAPTIVE_GAIN_CORRECT_TRIALS: usize = 200;

/// What the next session needs to know about a past one: its reward
/// history for the adaptive reward, its training phase and its correct
/// count for the adaptive gain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviousSession {
    pub ntrials: usize,
    pub ntrials_correct: usize,
    pub water_delivered: f64,
    /// Volume of the last reward actually delivered, if any.
    pub last_reward_amount: Option<f64>,
    /// Training phase of the last row that carried one.
    pub last_training_phase: Option<u8>,
}

impl PreviousSession {
    pub fn from_records(records: &[TrialRecord]) -> Self {
        let completed: Vec<&TrialRecord> = records.iter().filter(|r| r.is_complete()).collect();
        Self {
            ntrials: completed.len(),
            ntrials_correct: completed
                .iter()
                .filter(|r| r.trial_correct == Some(true))
                .count(),
            water_delivered: completed.iter().filter_map(|r| r.reward_amount).sum(),
            last_reward_amount: completed
                .iter()
                .rev()
                .filter_map(|r| r.reward_amount)
                .find(|a| *a > 0.0),
            last_training_phase: records.iter().rev().find_map(|r| r.training_phase),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_records(&load_records(path)?))
    }

    /// `STIM_GAIN` once the subject got more than
    /// [`ADAPTIVE_GAIN_CORRECT_TRIALS`] right, `AG_INIT_VALUE` before that.
    pub fn adaptive_gain(&self, params: &TaskParameters) -> f64 {
        if self.ntrials_correct > ADAPTIVE_GAIN_CORRECT_TRIALS {
            params.stim_gain
        } else {
            params.ag_init_value
        }
    }
}
