//! Task variants. Each one decides how blocks open and how a trial's
//! stimulus is drawn; the session does the rest.

use choicerig_core::{Outcome, ProtocolKind, ResponseSide, Result, TaskError};
use rand::Rng;
use rand::seq::IndexedRandom;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::block::{BlockState, advance_biased_block};
use crate::config::TaskParameters;
use crate::draw::{
    DEFAULT_BIASED_INDEX, DEFAULT_BIASED_WEIGHT, draw_contrast, draw_position, draw_stim_phase,
    truncated_exponential,
};
use crate::reward;
use crate::trial::TrialTable;

/// Highest training phase; phase 5 is full task difficulty.
pub const MAX_TRAINING_PHASE: u8 = 5;

/// Signed contrasts available to the training protocol.
pub const TRAINING_CONTRASTS: [f64; 11] = [
    -1.0, -0.5, -0.25, -0.125, -0.0625, 0.0, 0.0625, 0.125, 0.25, 0.5, 1.0,
];

/// Contrast at or above which a failed trial triggers a debiasing repeat.
const DEBIAS_CONTRAST: f64 = 0.5;
const DEBIAS_SIGMA: f64 = 0.5;

/// What a protocol sees when drawing the next trial.
#[derive(Debug, Clone, Copy)]
pub struct TrialContext<'a> {
    pub trial_num: usize,
    pub block: &'a BlockState,
    pub history: &'a TrialTable,
    pub params: &'a TaskParameters,
}

/// Per-trial values a protocol draws; the rest of the row is passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialDraw {
    pub contrast: f64,
    pub position: f64,
    pub quiescent_period: f64,
    pub stim_phase: f64,
    pub training_phase: Option<u8>,
    pub debias_trial: bool,
}

pub trait Protocol: std::fmt::Debug {
    fn kind(&self) -> ProtocolKind;

    /// Opens the next block in place. Called when the current one is exhausted.
    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        rng: &mut R,
    ) -> Result<()>;

    fn draw_trial<R: Rng + ?Sized>(&self, ctx: &TrialContext<'_>, rng: &mut R)
    -> Result<TrialDraw>;

    /// Volume of a correct trial's reward, in µl.
    fn draw_reward_amount<R: Rng + ?Sized>(
        &self,
        params: &TaskParameters,
        rng: &mut R,
    ) -> Result<f64> {
        reward::draw_reward_amount(&params.reward_schedule, params.reward_amount, rng)
    }

    /// Response side of an answered trial whose stimulus sat at position 0.
    ///
    /// `None` leaves the trial unresolvable and the session rejects it.
    fn center_response_side(&self, _outcome: Outcome) -> Option<ResponseSide> {
        None
    }
}

/// `QUIESCENT_PERIOD` plus a truncated exponential jitter.
pub fn draw_quiescent_period<R: Rng + ?Sized>(params: &TaskParameters, rng: &mut R) -> Result<f64> {
    let jitter = truncated_exponential(
        rng,
        params.quiescent_texp_factor,
        params.quiescent_texp_min,
        params.quiescent_texp_max,
    )?;
    Ok(params.quiescent_period + jitter)
}

fn draw_set_contrast<R: Rng + ?Sized>(params: &TaskParameters, rng: &mut R) -> Result<f64> {
    draw_contrast(
        rng,
        &params.contrast_set,
        params.contrast_set_probability_type,
        DEFAULT_BIASED_INDEX,
        DEFAULT_BIASED_WEIGHT,
    )
}

/// One open-ended block at `PROBABILITY_LEFT`.
fn open_single_block(block: &mut BlockState, params: &TaskParameters) -> Result<()> {
    if block.is_started() {
        return Err(TaskError::invariant(
            "single-block protocol asked for a second block",
        ));
    }
    block.begin(usize::MAX, params.probability_left)
}

/// Biased-choice world: alternating biased blocks after an optional
/// unbiased opener.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiasedProtocol;

impl Protocol for BiasedProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Biased
    }

    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        rng: &mut R,
    ) -> Result<()> {
        advance_biased_block(block, params, rng)
    }

    fn draw_trial<R: Rng + ?Sized>(
        &self,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialDraw> {
        let params = ctx.params;
        let position = draw_position(rng, &params.stim_positions, ctx.block.probability_left)?;
        let quiescent_period = draw_quiescent_period(params, rng)?;
        let contrast = draw_set_contrast(params, rng)?;
        let stim_phase = draw_stim_phase(rng);
        Ok(TrialDraw {
            contrast,
            position,
            quiescent_period,
            stim_phase,
            training_phase: None,
            debias_trial: false,
        })
    }
}

/// Probability of each of [`TRAINING_CONTRASTS`] at a training phase.
pub fn training_contrast_probabilities(phase: u8) -> Result<[f64; 11]> {
    let admit = |c: f64| -> bool {
        let a = c.abs();
        match phase {
            0 => a >= 0.5,
            1 => a >= 0.25,
            2 => a >= 0.125,
            3 => a >= 0.0625,
            4 => true,
            _ => a != 0.5,
        }
    };
    if phase > MAX_TRAINING_PHASE {
        return Err(TaskError::invalid(format!(
            "training phase {phase} above {MAX_TRAINING_PHASE}"
        )));
    }
    let admitted = TRAINING_CONTRASTS.iter().filter(|c| admit(**c)).count() as f64;
    let mut p = [0.0; 11];
    for (slot, c) in p.iter_mut().zip(TRAINING_CONTRASTS) {
        if admit(c) {
            *slot = 1.0 / admitted;
        }
    }
    Ok(p)
}

/// Signed contrast drawn uniformly among those the phase admits.
pub fn draw_training_contrast<R: Rng + ?Sized>(phase: u8, rng: &mut R) -> Result<f64> {
    let p = training_contrast_probabilities(phase)?;
    let admitted: Vec<f64> = TRAINING_CONTRASTS
        .iter()
        .zip(p)
        .filter(|(_, p)| *p > 0.0)
        .map(|(c, _)| *c)
        .collect();
    admitted
        .choose(rng)
        .copied()
        .ok_or_else(|| TaskError::invalid(format!("no contrast admitted at phase {phase}")))
}

/// Training world: contrast difficulty set by phase, no blocks, and
/// repeats of failed easy trials placed against the subject's side bias.
#[derive(Debug, Clone, Copy)]
pub struct TrainingProtocol {
    pub phase: u8,
    pub debias: bool,
}

impl TrainingProtocol {
    pub fn new(phase: u8, debias: bool) -> Result<Self> {
        if phase > MAX_TRAINING_PHASE {
            return Err(TaskError::invalid(format!(
                "training phase {phase} above {MAX_TRAINING_PHASE}"
            )));
        }
        Ok(Self { phase, debias })
    }

    /// Contrast to repeat when the last trial was an easy one that failed.
    fn debias_contrast(&self, history: &TrialTable) -> Option<f64> {
        if !self.debias || self.phase >= MAX_TRAINING_PHASE {
            return None;
        }
        let last = history.last_completed()?;
        (last.trial_correct != Some(true) && last.contrast >= DEBIAS_CONTRAST)
            .then_some(last.contrast)
    }
}

impl Protocol for TrainingProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Training
    }

    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        _rng: &mut R,
    ) -> Result<()> {
        open_single_block(block, params)
    }

    fn draw_trial<R: Rng + ?Sized>(
        &self,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialDraw> {
        let params = ctx.params;
        let [left, right] = params.stim_positions;

        let (contrast, position, debias_trial) = match self.debias_contrast(ctx.history) {
            Some(contrast) => {
                let average_right = ctx.history.fraction_responded(ResponseSide::Right);
                let normal = Normal::new(average_right, DEBIAS_SIGMA)
                    .map_err(|e| TaskError::invalid(e.to_string()))?;
                let position = if normal.sample(rng) >= 0.5 { right } else { left };
                debug!(trial_num = ctx.trial_num, average_right, position, "debias trial");
                (contrast, position, true)
            }
            None => {
                let signed = draw_training_contrast(self.phase, rng)?;
                let position = if signed > 0.0 { right } else { left };
                (signed.abs(), position, false)
            }
        };

        let quiescent_period = draw_quiescent_period(params, rng)?;
        let stim_phase = draw_stim_phase(rng);
        Ok(TrialDraw {
            contrast,
            position,
            quiescent_period,
            stim_phase,
            training_phase: Some(self.phase),
            debias_trial,
        })
    }
}

/// Habituation: full-contrast stimuli only, one block.
#[derive(Debug, Clone, Copy, Default)]
pub struct HabituationProtocol;

impl Protocol for HabituationProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Habituation
    }

    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        _rng: &mut R,
    ) -> Result<()> {
        open_single_block(block, params)
    }

    fn draw_trial<R: Rng + ?Sized>(
        &self,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialDraw> {
        let params = ctx.params;
        let position = draw_position(rng, &params.stim_positions, ctx.block.probability_left)?;
        let quiescent_period = draw_quiescent_period(params, rng)?;
        Ok(TrialDraw {
            contrast: 1.0,
            position,
            quiescent_period,
            stim_phase: draw_stim_phase(rng),
            training_phase: None,
            debias_trial: false,
        })
    }
}

/// Configured contrast set and side probability without blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvancedProtocol;

impl Protocol for AdvancedProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Advanced
    }

    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        _rng: &mut R,
    ) -> Result<()> {
        open_single_block(block, params)
    }

    fn draw_trial<R: Rng + ?Sized>(
        &self,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialDraw> {
        let params = ctx.params;
        let position = draw_position(rng, &params.stim_positions, ctx.block.probability_left)?;
        let quiescent_period = draw_quiescent_period(params, rng)?;
        let contrast = draw_set_contrast(params, rng)?;
        Ok(TrialDraw {
            contrast,
            position,
            quiescent_period,
            stim_phase: draw_stim_phase(rng),
            training_phase: None,
            debias_trial: false,
        })
    }
}

/// Protocol picked at runtime from a [`ProtocolKind`].
#[derive(Debug, Clone, Copy)]
pub enum AnyProtocol {
    Biased(BiasedProtocol),
    Training(TrainingProtocol),
    Habituation(HabituationProtocol),
    Advanced(AdvancedProtocol),
}

impl AnyProtocol {
    pub fn from_kind(kind: ProtocolKind, params: &TaskParameters) -> Result<Self> {
        Ok(match kind {
            ProtocolKind::Biased => AnyProtocol::Biased(BiasedProtocol),
            ProtocolKind::Training => AnyProtocol::Training(TrainingProtocol::new(
                params.training_phase,
                params.debias,
            )?),
            ProtocolKind::Habituation => AnyProtocol::Habituation(HabituationProtocol),
            ProtocolKind::Advanced => AnyProtocol::Advanced(AdvancedProtocol),
        })
    }
}

macro_rules! delegate {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            AnyProtocol::Biased($p) => $body,
            AnyProtocol::Training($p) => $body,
            AnyProtocol::Habituation($p) => $body,
            AnyProtocol::Advanced($p) => $body,
        }
    };
}

impl Protocol for AnyProtocol {
    fn kind(&self) -> ProtocolKind {
        delegate!(self, p => p.kind())
    }

    fn advance_block<R: Rng + ?Sized>(
        &self,
        block: &mut BlockState,
        params: &TaskParameters,
        rng: &mut R,
    ) -> Result<()> {
        delegate!(self, p => p.advance_block(block, params, rng))
    }

    fn draw_trial<R: Rng + ?Sized>(
        &self,
        ctx: &TrialContext<'_>,
        rng: &mut R,
    ) -> Result<TrialDraw> {
        delegate!(self, p => p.draw_trial(ctx, rng))
    }

    fn draw_reward_amount<R: Rng + ?Sized>(
        &self,
        params: &TaskParameters,
        rng: &mut R,
    ) -> Result<f64> {
        delegate!(self, p => p.draw_reward_amount(params, rng))
    }

    fn center_response_side(&self, outcome: Outcome) -> Option<ResponseSide> {
        delegate!(self, p => p.center_response_side(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choicerig_core::{TrialOutcome, TrialRecord};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ctx<'a>(
        block: &'a BlockState,
        history: &'a TrialTable,
        params: &'a TaskParameters,
    ) -> TrialContext<'a> {
        TrialContext {
            trial_num: history.len(),
            block,
            history,
            params,
        }
    }

    fn completed_row(trial_num: usize, contrast: f64, position: f64, correct: bool) -> TrialRecord {
        let mut row = TrialRecord {
            trial_num,
            block_num: 0,
            block_trial_num: trial_num,
            contrast,
            position,
            quiescent_period: 0.5,
            stim_phase: 0.0,
            stim_angle: 0.0,
            stim_freq: 0.1,
            stim_sigma: 7.0,
            stim_gain: 4.0,
            stim_reverse: false,
            stim_probability_left: 0.5,
            training_phase: Some(0),
            debias_trial: false,
            outcome: None,
            response_time: None,
            response_side: None,
            reward_amount: None,
            reward_valve_time: None,
            trial_correct: None,
        };
        let outcome = if correct { Outcome::Correct } else { Outcome::Error };
        let response_side = ResponseSide::resolve(outcome, position).unwrap();
        row.apply_outcome(&TrialOutcome {
            outcome,
            response_side,
            response_time: Some(0.5),
            reward_amount: 0.0,
            reward_valve_time: 0.0,
        })
        .unwrap();
        row
    }

    #[test]
    fn training_phase_probabilities() {
        let expected_counts = [4usize, 6, 8, 10, 11, 9];
        for phase in 0..=MAX_TRAINING_PHASE {
            let p = training_contrast_probabilities(phase).unwrap();
            let admitted = p.iter().filter(|p| **p > 0.0).count();
            assert_eq!(admitted, expected_counts[phase as usize], "phase {phase}");
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
        let p5 = training_contrast_probabilities(5).unwrap();
        assert_eq!(p5[1], 0.0);
        assert_eq!(p5[9], 0.0);
        assert!(training_contrast_probabilities(6).is_err());
    }

    #[test]
    fn quiescent_period_adds_jitter() {
        let params = TaskParameters::default();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let q = draw_quiescent_period(&params, &mut rng).unwrap();
            assert!((0.4..=0.7).contains(&q), "{q}");
        }
    }

    #[test]
    fn biased_trial_uses_block_bias() {
        let params = TaskParameters::default();
        let mut block = BlockState::new();
        block.begin(50, 1.0).unwrap();
        let history = TrialTable::new();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let draw = BiasedProtocol.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
            assert_eq!(draw.position, -35.0);
            assert!(params.contrast_set.contains(&draw.contrast));
            assert!(draw.training_phase.is_none());
        }
    }

    #[test]
    fn training_phase_zero_draws_easy_contrasts() {
        let params = TaskParameters::default();
        let protocol = TrainingProtocol::new(0, true).unwrap();
        let mut block = BlockState::new();
        protocol.advance_block(&mut block, &params, &mut StdRng::seed_from_u64(0)).unwrap();
        let history = TrialTable::new();
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..200 {
            let draw = protocol.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
            assert!(draw.contrast >= 0.5);
            assert_eq!(draw.training_phase, Some(0));
            assert!(!draw.debias_trial);
        }
        assert!(protocol.advance_block(&mut block, &params, &mut rng).is_err());
    }

    #[test]
    fn failed_easy_trial_is_repeated() {
        let params = TaskParameters::default();
        let protocol = TrainingProtocol::new(2, true).unwrap();
        let mut block = BlockState::new();
        block.begin(usize::MAX, 0.5).unwrap();
        let mut history = TrialTable::new();
        history.push(completed_row(0, 1.0, 35.0, false)).unwrap();

        let mut rng = StdRng::seed_from_u64(13);
        let draw = protocol.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
        assert!(draw.debias_trial);
        assert_eq!(draw.contrast, 1.0);

        let mut history = TrialTable::new();
        history.push(completed_row(0, 0.25, 35.0, false)).unwrap();
        let draw = protocol.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
        assert!(!draw.debias_trial);

        let no_debias = TrainingProtocol::new(2, false).unwrap();
        let mut history = TrialTable::new();
        history.push(completed_row(0, 1.0, 35.0, false)).unwrap();
        let draw = no_debias.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
        assert!(!draw.debias_trial);
    }

    #[test]
    fn habituation_is_full_contrast() {
        let params = TaskParameters::default();
        let protocol = AnyProtocol::from_kind(ProtocolKind::Habituation, &params).unwrap();
        let mut rng = StdRng::seed_from_u64(14);
        let mut block = BlockState::new();
        protocol.advance_block(&mut block, &params, &mut rng).unwrap();
        assert_eq!(block.probability_left, params.probability_left);
        let history = TrialTable::new();
        let draw = protocol.draw_trial(&ctx(&block, &history, &params), &mut rng).unwrap();
        assert_eq!(draw.contrast, 1.0);
        assert_eq!(protocol.kind(), ProtocolKind::Habituation);
        assert_eq!(protocol.center_response_side(Outcome::Correct), None);
    }
}
