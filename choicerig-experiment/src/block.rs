use choicerig_core::{Result, TaskError};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::config::TaskParameters;
use crate::draw::{draw_block_probability, truncated_exponential};

/// Length of the unbiased opening block when `BLOCK_INIT_5050` is set.
pub const INIT_5050_BLOCK_LEN: usize = 90;

/// The block currently feeding trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockState {
    pub block_num: usize,
    pub block_len: usize,
    pub block_trial_num: usize,
    pub probability_left: f64,
    started: bool,
}

impl Default for BlockState {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockState {
    /// State before the first block; the first `next_trial` opens block 0.
    pub fn new() -> Self {
        Self {
            block_num: 0,
            block_len: 0,
            block_trial_num: 0,
            probability_left: 0.5,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True when the next trial cannot fit in this block.
    pub fn is_exhausted(&self) -> bool {
        !self.started || self.block_trial_num + 1 >= self.block_len
    }

    /// Index the next block will get.
    pub fn next_block_num(&self) -> usize {
        if self.started { self.block_num + 1 } else { 0 }
    }

    /// Opens the next block with the given length and bias.
    pub fn begin(&mut self, block_len: usize, probability_left: f64) -> Result<()> {
        if block_len == 0 {
            return Err(TaskError::invalid("block length must be at least 1"));
        }
        if !(0.0..=1.0).contains(&probability_left) {
            return Err(TaskError::invalid(format!(
                "block probability_left must be within [0, 1], got {probability_left}"
            )));
        }
        self.block_num = self.next_block_num();
        self.block_len = block_len;
        self.block_trial_num = 0;
        self.probability_left = probability_left;
        self.started = true;
        Ok(())
    }

    /// Moves to the next trial of the current block.
    pub fn step(&mut self) -> Result<()> {
        if self.is_exhausted() {
            return Err(TaskError::invariant(format!(
                "block {} has no trials left ({} of {})",
                self.block_num,
                self.block_trial_num + 1,
                self.block_len
            )));
        }
        self.block_trial_num += 1;
        Ok(())
    }
}

/// Bias of the block following one at `p`: 0.2 becomes 0.8, 0.5 stays 0.5.
///
/// `|1 - p|` is rounded to one decimal from its exact binary value with ties
/// to even, so 0.75 flips to 0.2 and 0.55 to 0.4.
pub fn flip_probability(p: f64) -> f64 {
    let flipped = (1.0 - p).abs();
    format!("{flipped:.1}").parse().unwrap_or(flipped)
}

/// Opens the next block of the biased-choice protocol.
///
/// With `BLOCK_INIT_5050` the session starts with [`INIT_5050_BLOCK_LEN`]
/// unbiased trials and block 1 is the first drawn from
/// `BLOCK_PROBABILITY_SET`; without it block 0 is drawn. Every later block
/// flips the previous bias. The length is drawn before the bias.
pub fn advance_biased_block<R: Rng + ?Sized>(
    block: &mut BlockState,
    params: &TaskParameters,
    rng: &mut R,
) -> Result<()> {
    let block_num = block.next_block_num();
    let init_5050 = params.block_init_5050;

    let block_len = if init_5050 && block_num == 0 {
        INIT_5050_BLOCK_LEN
    } else {
        let len = truncated_exponential(
            rng,
            params.block_len_factor,
            params.block_len_min,
            params.block_len_max,
        )?;
        (len.floor() as usize).max(1)
    };

    let probability_left = match block_num {
        0 if init_5050 => 0.5,
        0 => draw_block_probability(rng, &params.block_probability_set)?,
        1 if init_5050 => draw_block_probability(rng, &params.block_probability_set)?,
        _ => flip_probability(block.probability_left),
    };

    block.begin(block_len, probability_left)?;
    info!(
        block_num = block.block_num,
        block_len = block.block_len,
        probability_left = block.probability_left,
        "new block"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn flip_alternates_and_rounds() {
        assert_eq!(flip_probability(0.2), 0.8);
        assert_eq!(flip_probability(0.8), 0.2);
        assert_eq!(flip_probability(0.5), 0.5);
        assert_eq!(flip_probability(0.1), 0.9);
        assert_eq!(flip_probability(0.75), 0.2);
        assert_eq!(flip_probability(0.55), 0.4);
        assert_eq!(flip_probability(0.65), 0.3);
        assert_eq!(flip_probability(0.15), 0.8);
    }

    #[test]
    fn quarter_biases_keep_alternating() {
        let mut p = 0.75;
        let mut seen = Vec::new();
        for _ in 0..4 {
            p = flip_probability(p);
            seen.push(p);
        }
        assert_eq!(seen, vec![0.2, 0.8, 0.2, 0.8]);
    }

    #[test]
    fn init_5050_sequence() {
        let params = TaskParameters::default();
        let mut rng = StdRng::seed_from_u64(90);
        let mut block = BlockState::new();
        assert!(block.is_exhausted());

        advance_biased_block(&mut block, &params, &mut rng).unwrap();
        assert_eq!(block.block_num, 0);
        assert_eq!(block.block_len, INIT_5050_BLOCK_LEN);
        assert_eq!(block.probability_left, 0.5);

        advance_biased_block(&mut block, &params, &mut rng).unwrap();
        assert_eq!(block.block_num, 1);
        assert!(params.block_probability_set.contains(&block.probability_left));
        let b1 = block.probability_left;

        advance_biased_block(&mut block, &params, &mut rng).unwrap();
        assert_eq!(block.block_num, 2);
        assert_eq!(block.probability_left, flip_probability(b1));
        assert!((20..=100).contains(&block.block_len));
        assert_eq!(block.block_trial_num, 0);
    }

    #[test]
    fn without_init_5050_block_zero_is_drawn() {
        let params = TaskParameters {
            block_init_5050: false,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut block = BlockState::new();
        advance_biased_block(&mut block, &params, &mut rng).unwrap();
        assert!(params.block_probability_set.contains(&block.probability_left));
        assert!((20..=100).contains(&block.block_len));
        let b0 = block.probability_left;
        advance_biased_block(&mut block, &params, &mut rng).unwrap();
        assert_eq!(block.probability_left, flip_probability(b0));
    }

    #[test]
    fn step_runs_to_block_end() {
        let mut block = BlockState::new();
        block.begin(3, 0.5).unwrap();
        assert!(!block.is_exhausted());
        block.step().unwrap();
        block.step().unwrap();
        assert_eq!(block.block_trial_num, 2);
        assert!(block.is_exhausted());
        assert!(matches!(block.step(), Err(TaskError::InvariantViolation(_))));
        assert!(block.begin(0, 0.5).is_err());
    }
}
