use std::time::Duration;

use choicerig_core::{
    Outcome, RENDERER_FIELDS, RawOutcome, ResponseSide, Result, StimulusMessage, TaskError,
    TrialOutcome, TrialRecord, TrialState,
};
use choicerig_timing::Timer;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::block::BlockState;
use crate::config::TaskParameters;
use crate::datalog::LogEntry;
use crate::protocol::{Protocol, TrialContext};
use crate::rig::Rig;
use crate::stats::SessionAggregates;
use crate::stopping::StopReason;
use crate::trial::{PsychometricPoint, TrialTable};

/// What `record_outcome` resolved for the trial it closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialCompletion {
    pub trial_num: usize,
    pub outcome: Outcome,
    pub response_side: ResponseSide,
    pub response_time: Option<f64>,
    pub reward_amount: f64,
    /// Stop recommendation after this trial, if any rule fired.
    pub stop: Option<StopReason>,
}

/// Trial sequencer of one session.
///
/// Alternates strictly between [`Session::next_trial`] and
/// [`Session::record_outcome`]; calling either out of turn is an
/// [`TaskError::InvariantViolation`].
pub struct Session<P, T, R>
where
    P: Protocol,
    T: Timer,
    R: Rng,
{
    protocol: P,
    timer: T,
    rng: R,
    params: TaskParameters,
    rig: Rig,
    block: BlockState,
    blocks: Vec<BlockState>,
    trials: TrialTable,
    aggregates: SessionAggregates,
    state: TrialState,
    session_start: T::Timestamp,
    stop_recommendation: Option<StopReason>,
}

impl<P, T, R> Session<P, T, R>
where
    P: Protocol,
    T: Timer,
    R: Rng,
{
    pub fn new(params: TaskParameters, protocol: P, timer: T, rng: R, rig: Rig) -> Result<Self> {
        params.validate()?;
        let session_start = timer.now();
        info!(protocol = %protocol.kind(), ntrials = params.ntrials, "session started");
        Ok(Self {
            protocol,
            timer,
            rng,
            params,
            rig,
            block: BlockState::new(),
            blocks: Vec::new(),
            trials: TrialTable::new(),
            aggregates: SessionAggregates::new(),
            state: TrialState::PendingGeneration,
            session_start,
            stop_recommendation: None,
        })
    }

    /// Draws the next trial, commits its row and notifies the renderer.
    ///
    /// Nothing is committed when a draw fails.
    pub fn next_trial(&mut self) -> Result<&TrialRecord> {
        if !self.state.ready_for_next_trial() {
            let pending = self.trials.len().saturating_sub(1);
            return Err(TaskError::invariant(format!(
                "next_trial called while trial {pending} awaits its outcome"
            )));
        }
        let trial_num = self.trials.len();

        let mut block = self.block.clone();
        let opened = block.is_exhausted();
        if opened {
            self.protocol
                .advance_block(&mut block, &self.params, &mut self.rng)?;
        } else {
            block.step()?;
        }

        let ctx = TrialContext {
            trial_num,
            block: &block,
            history: &self.trials,
            params: &self.params,
        };
        let draw = self.protocol.draw_trial(&ctx, &mut self.rng)?;

        let params = &self.params;
        let record = TrialRecord {
            trial_num,
            block_num: block.block_num,
            block_trial_num: block.block_trial_num,
            contrast: draw.contrast,
            position: draw.position,
            quiescent_period: draw.quiescent_period,
            stim_phase: draw.stim_phase,
            stim_angle: params.stim_angle,
            stim_freq: params.stim_freq,
            stim_sigma: params.stim_sigma,
            stim_gain: params.stim_gain,
            stim_reverse: params.stim_reverse,
            stim_probability_left: block.probability_left,
            training_phase: draw.training_phase,
            debias_trial: draw.debias_trial,
            outcome: None,
            response_time: None,
            response_side: None,
            reward_amount: None,
            reward_valve_time: None,
            trial_correct: None,
        };
        self.trials.push(record)?;

        if opened {
            self.blocks.push(block.clone());
        }
        self.block = block;
        self.state = TrialState::AwaitingOutcome;

        let record = self
            .trials
            .current()
            .ok_or_else(|| TaskError::invariant("trial table empty after append"))?;
        let message = StimulusMessage::from_record(record, RENDERER_FIELDS);
        self.rig.stimulus.send(&message);
        debug!(
            trial_num,
            block_num = record.block_num,
            block_trial_num = record.block_trial_num,
            position = record.position,
            contrast = record.contrast,
            quiescent_period = record.quiescent_period,
            "trial generated"
        );
        Ok(record)
    }

    /// Closes the pending trial with the hardware's export of it.
    ///
    /// The completed row is written to the durable log before it is
    /// committed; a log failure leaves the trial pending.
    pub fn record_outcome(&mut self, raw: &RawOutcome) -> Result<TrialCompletion> {
        if self.state != TrialState::AwaitingOutcome {
            return Err(TaskError::invariant(
                "record_outcome called without a pending trial",
            ));
        }
        let current = self
            .trials
            .current()
            .ok_or_else(|| TaskError::invariant("no trial to record an outcome for"))?;
        let trial_num = current.trial_num;

        let outcome = raw.classify()?;
        let response_side = ResponseSide::resolve(outcome, current.position)
            .or_else(|| self.protocol.center_response_side(outcome))
            .ok_or_else(|| {
                TaskError::invariant(format!(
                    "trial {trial_num}: {} protocol has no response side for a centred stimulus",
                    self.protocol.kind()
                ))
            })?;

        let response_time = raw.response_time(outcome);
        if response_time.is_none() {
            warn!(trial_num, "no response time in trial export");
        }

        let reward_amount = if outcome == Outcome::Correct {
            self.protocol
                .draw_reward_amount(&self.params, &mut self.rng)?
        } else {
            0.0
        };
        let reward_valve_time = self.rig.valve.open_time(reward_amount)?;

        let mut completed = current.clone();
        completed.apply_outcome(&TrialOutcome {
            outcome,
            response_side,
            response_time,
            reward_amount,
            reward_valve_time,
        })?;
        self.rig.log.append(&LogEntry {
            record: &completed,
            behavior_data: raw,
        })?;

        let row = self
            .trials
            .current_mut()
            .ok_or_else(|| TaskError::invariant("trial table empty while recording"))?;
        *row = completed;
        self.aggregates.record(outcome, reward_amount);
        self.state = TrialState::OutcomeRecorded;

        let stop = self.check_stop_criteria();
        if let Some(reason) = stop {
            if self.stop_recommendation.is_none() {
                warn!(trial_num, code = reason.code(), "{reason}");
            }
            self.stop_recommendation = Some(reason);
        }
        self.log_trial_summary();

        Ok(TrialCompletion {
            trial_num,
            outcome,
            response_side,
            response_time,
            reward_amount,
            stop,
        })
    }

    /// Advisory stop recommendation for the session so far.
    pub fn check_stop_criteria(&self) -> Option<StopReason> {
        let trial_num = self.trials.last_completed()?.trial_num;
        self.params
            .stopping
            .should_stop(self.elapsed(), &self.trials.response_times(), trial_num)
    }

    fn log_trial_summary(&self) {
        let Some(r) = self.trials.current() else {
            return;
        };
        info!(
            trial_num = r.trial_num,
            position = r.position,
            contrast = r.contrast,
            stim_phase = r.stim_phase,
            block_num = r.block_num,
            block_len = self.block.block_len,
            block_trial_num = r.block_trial_num,
            stim_probability_left = r.stim_probability_left,
            response_time = ?r.response_time,
            trial_correct = ?r.trial_correct,
            ntrials_correct = self.aggregates.ntrials_correct,
            ntrials_error = self.aggregates.ntrials_error(),
            water_delivered = self.aggregates.water_delivered,
            elapsed_s = self.elapsed().as_secs_f64(),
            "trial completed"
        );
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed(self.session_start)
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn params(&self) -> &TaskParameters {
        &self.params
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// The block feeding the current trial.
    pub fn block(&self) -> &BlockState {
        &self.block
    }

    /// Every block opened so far, as it was when opened.
    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    pub fn trials(&self) -> &TrialTable {
        &self.trials
    }

    pub fn aggregates(&self) -> &SessionAggregates {
        &self.aggregates
    }

    /// Latest stop recommendation; sticks once raised.
    pub fn stop_recommendation(&self) -> Option<StopReason> {
        self.stop_recommendation
    }

    pub fn psychometric_curve(&self) -> Vec<PsychometricPoint> {
        self.trials.psychometric_curve()
    }

    /// Ends the session, keeping only trials that received an outcome.
    pub fn finish(self) -> Vec<TrialRecord> {
        info!(
            ntrials = self.aggregates.ntrials,
            ntrials_correct = self.aggregates.ntrials_correct,
            water_delivered = self.aggregates.water_delivered,
            elapsed_s = self.elapsed().as_secs_f64(),
            "session finished"
        );
        self.trials.into_completed()
    }
}
