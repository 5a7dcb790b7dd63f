//! Sampling primitives used to build trials.
//!
//! Every function takes the session RNG explicitly so a seeded session
//! replays exactly.

use std::f64::consts::TAU;

use choicerig_core::{Result, TaskError};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::IndexedRandom;
use rand_distr::Exp;

use crate::config::ContrastProbabilityType;

/// Upper bound on rejection-sampling attempts before giving up.
pub const MAX_SAMPLING_ATTEMPTS: usize = 10_000;

/// Index down-weighted by the `biased` contrast mode when none is given: the last contrast.
pub const DEFAULT_BIASED_INDEX: isize = -1;
pub const DEFAULT_BIASED_WEIGHT: f64 = 0.5;

/// Draws from an exponential with mean `factor`, redrawing until the value
/// lands in `[min, max]`.
///
/// Values are never clamped, so the result follows the exponential density
/// restricted to the interval.
pub fn truncated_exponential<R: Rng + ?Sized>(
    rng: &mut R,
    factor: f64,
    min: f64,
    max: f64,
) -> Result<f64> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(TaskError::invalid(format!(
            "exponential factor must be positive, got {factor}"
        )));
    }
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(TaskError::invalid(format!(
            "invalid truncation bounds [{min}, {max}]"
        )));
    }
    let exp = Exp::new(1.0 / factor).map_err(|e| TaskError::invalid(e.to_string()))?;
    for _ in 0..MAX_SAMPLING_ATTEMPTS {
        let x = exp.sample(rng);
        if (min..=max).contains(&x) {
            return Ok(x);
        }
    }
    Err(TaskError::Sampling(format!(
        "no exponential draw (factor {factor}) fell in [{min}, {max}] after {MAX_SAMPLING_ATTEMPTS} attempts"
    )))
}

/// Probabilities over `n` items where item `biased_index` is `biased_weight`
/// times as likely as each of the others. `-1` addresses the last item.
pub fn biased_probabilities(n: usize, biased_index: isize, biased_weight: f64) -> Result<Vec<f64>> {
    if biased_index < -1 || biased_index >= n as isize {
        return Err(TaskError::invalid(format!(
            "biased index {biased_index} outside [-1, {n})"
        )));
    }
    if n == 1 {
        return Ok(vec![1.0]);
    }
    if n == 0 {
        return Err(TaskError::invalid("cannot bias an empty set"));
    }
    if biased_weight == 0.0 || !biased_weight.is_finite() || biased_weight < 0.0 {
        return Err(TaskError::invalid(format!(
            "biased weight must be larger than 0, got {biased_weight}"
        )));
    }
    let z = (n - 1) as f64 + biased_weight;
    let mut p = vec![1.0 / z; n];
    let idx = if biased_index == -1 {
        n - 1
    } else {
        biased_index as usize
    };
    p[idx] *= biased_weight;
    Ok(p)
}

/// Draws one contrast from `contrast_set`.
pub fn draw_contrast<R: Rng + ?Sized>(
    rng: &mut R,
    contrast_set: &[f64],
    mode: ContrastProbabilityType,
    biased_index: isize,
    biased_weight: f64,
) -> Result<f64> {
    if contrast_set.is_empty() {
        return Err(TaskError::invalid("contrast set is empty"));
    }
    match mode {
        ContrastProbabilityType::Biased => {
            let p = biased_probabilities(contrast_set.len(), biased_index, biased_weight)?;
            let dist = WeightedIndex::new(&p).map_err(|e| TaskError::invalid(e.to_string()))?;
            Ok(contrast_set[dist.sample(rng)])
        }
        ContrastProbabilityType::Uniform => contrast_set
            .choose(rng)
            .copied()
            .ok_or_else(|| TaskError::invalid("contrast set is empty")),
    }
}

/// Picks the first position with probability `probability_left`, else the second.
pub fn draw_position<R: Rng + ?Sized>(
    rng: &mut R,
    position_set: &[f64],
    probability_left: f64,
) -> Result<f64> {
    let [left, right] = position_set else {
        return Err(TaskError::invalid(format!(
            "expected exactly two positions, got {}",
            position_set.len()
        )));
    };
    if !(0.0..=1.0).contains(&probability_left) {
        return Err(TaskError::invalid(format!(
            "probability_left must be within [0, 1], got {probability_left}"
        )));
    }
    Ok(if rng.random_bool(probability_left) {
        *left
    } else {
        *right
    })
}

/// Uniform choice of one block bias from the configured set.
pub fn draw_block_probability<R: Rng + ?Sized>(rng: &mut R, probability_set: &[f64]) -> Result<f64> {
    probability_set
        .choose(rng)
        .copied()
        .ok_or_else(|| TaskError::invalid("block probability set is empty"))
}

/// Grating phase, uniform over one cycle.
pub fn draw_stim_phase<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(0.0..TAU)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7816)
    }

    #[test]
    fn truncated_exponential_stays_in_bounds() {
        let mut rng = rng();
        for (factor, min, max) in [(0.35, 0.2, 0.5), (60.0, 20.0, 100.0), (1.0, 0.0, 0.01)] {
            for _ in 0..2000 {
                let x = truncated_exponential(&mut rng, factor, min, max).unwrap();
                assert!(min <= x && x <= max, "{x} outside [{min}, {max}]");
            }
        }
    }

    #[test]
    fn truncated_exponential_gives_up_on_empty_support() {
        let mut rng = rng();
        let err = truncated_exponential(&mut rng, 0.01, 1000.0, 1001.0).unwrap_err();
        assert!(matches!(err, TaskError::Sampling(_)));
        assert!(matches!(
            truncated_exponential(&mut rng, 1.0, 2.0, 1.0),
            Err(TaskError::InvalidArgument(_))
        ));
        assert!(matches!(
            truncated_exponential(&mut rng, 0.0, 0.0, 1.0),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn biased_probabilities_sum_to_one_with_weight_ratio() {
        for n in 2..8usize {
            for idx in -1..n as isize {
                for w in [0.1, 0.5, 2.0, 7.5] {
                    let p = biased_probabilities(n, idx, w).unwrap();
                    let sum: f64 = p.iter().sum();
                    assert!((sum - 1.0).abs() < 1e-12);
                    let target = if idx == -1 { n - 1 } else { idx as usize };
                    let other = (target + 1) % n;
                    assert!((p[target] / p[other] - w).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn biased_probabilities_edge_cases() {
        assert_eq!(biased_probabilities(1, 0, 0.0).unwrap(), vec![1.0]);
        assert_eq!(biased_probabilities(1, -1, 42.0).unwrap(), vec![1.0]);
        assert!(biased_probabilities(3, 3, 0.5).is_err());
        assert!(biased_probabilities(3, -2, 0.5).is_err());
        assert!(biased_probabilities(3, 0, 0.0).is_err());
        assert!(biased_probabilities(0, -1, 0.5).is_err());
    }

    #[test]
    fn uniform_contrasts_converge_to_equal_frequencies() {
        let mut rng = rng();
        let set = [1.0, 0.5, 0.25, 0.125, 0.0625, 0.0];
        let n = 60_000;
        let mut counts = [0usize; 6];
        for _ in 0..n {
            let c = draw_contrast(&mut rng, &set, ContrastProbabilityType::Uniform, -1, 0.5)
                .unwrap();
            let i = set.iter().position(|s| *s == c).unwrap();
            counts[i] += 1;
        }
        for count in counts {
            let freq = count as f64 / n as f64;
            assert!((freq - 1.0 / 6.0).abs() < 0.01, "frequency {freq}");
        }
    }

    #[test]
    fn biased_contrasts_halve_zero_contrast() {
        let mut rng = rng();
        let set = [1.0, 0.25, 0.125, 0.0625, 0.0];
        let n = 45_000;
        let zeros = (0..n)
            .filter(|_| {
                draw_contrast(
                    &mut rng,
                    &set,
                    ContrastProbabilityType::Biased,
                    DEFAULT_BIASED_INDEX,
                    DEFAULT_BIASED_WEIGHT,
                )
                .unwrap()
                    == 0.0
            })
            .count();
        // weights 1,1,1,1,0.5 -> p(0) = 0.5 / 4.5
        let freq = zeros as f64 / n as f64;
        assert!((freq - 1.0 / 9.0).abs() < 0.01, "frequency {freq}");
    }

    #[test]
    fn position_follows_probability_left() {
        let mut rng = rng();
        let positions = [-35.0, 35.0];
        assert_eq!(draw_position(&mut rng, &positions, 1.0).unwrap(), -35.0);
        assert_eq!(draw_position(&mut rng, &positions, 0.0).unwrap(), 35.0);
        let n = 20_000;
        let left = (0..n)
            .filter(|_| draw_position(&mut rng, &positions, 0.8).unwrap() < 0.0)
            .count();
        assert!((left as f64 / n as f64 - 0.8).abs() < 0.015);
        assert!(draw_position(&mut rng, &[-35.0], 0.5).is_err());
        assert!(draw_position(&mut rng, &positions, 1.5).is_err());
    }

    #[test]
    fn phase_within_one_cycle() {
        let mut rng = rng();
        for _ in 0..1000 {
            let phase = draw_stim_phase(&mut rng);
            assert!((0.0..TAU).contains(&phase));
        }
    }
}
