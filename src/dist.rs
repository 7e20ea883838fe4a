/// Primitive distributions
///
/// Validation and draw routines for `flip`, `discrete`, `uniform` and
/// `binomial`. The discrete table is the normal form shared with the rest of
/// the interpreter: weights padded to the next power of two and normalised,
/// with the outcome width derived from the padded length.

use crate::errors::{DiceError, Result};
use rand::Rng;

/// Rejects probabilities outside `[0, 1]` (NaN included).
pub fn check_probability(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(DiceError::range(format!(
            "probability must lie in [0, 1] (got {})",
            p
        )));
    }
    Ok(())
}

/// One Bernoulli draw. `flip 0.0` and `flip 1.0` are deterministic because
/// the underlying uniform draw lies in `[0, 1)`.
pub fn sample_flip<R: Rng>(rng: &mut R, p: f64) -> Result<bool> {
    check_probability(p)?;
    Ok(rng.gen::<f64>() < p)
}

// ---------------------------------------------------------------------------
// Discrete
// ---------------------------------------------------------------------------

/// A categorical distribution over `0..2^bit_width`, already padded and
/// normalised. Outcome `i` carries the value `int(bit_width, i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteTable {
    pub bit_width: u32,
    pub probs: Vec<f64>,
}

impl DiscreteTable {
    /// Accepts any non-negative weights with a positive sum; they need not
    /// sum to one. A single-outcome table still gets width 1, since `int(0)`
    /// is not a value.
    pub fn new(weights: &[f64]) -> Result<DiscreteTable> {
        if weights.is_empty() {
            return Err(DiceError::range("discrete requires at least one weight"));
        }
        for &w in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(DiceError::range(format!(
                    "invalid discrete weight ({})",
                    w
                )));
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(DiceError::range("discrete weights sum to zero"));
        }

        let bit_width = weights.len().next_power_of_two().trailing_zeros().max(1);
        let padded_len = 1usize << bit_width;
        let mut probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
        probs.resize(padded_len, 0.0);

        Ok(DiscreteTable { bit_width, probs })
    }

    /// Cumulative-threshold draw. Floating-point slack on the running sum is
    /// absorbed by falling back to the last positive-weight outcome.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        let u = rng.gen::<f64>();
        let mut accumulated = 0.0;
        let mut last_positive = 0;
        for (i, &p) in self.probs.iter().enumerate() {
            if p > 0.0 {
                last_positive = i;
            }
            accumulated += p;
            if u < accumulated {
                return i as u64;
            }
        }
        last_positive as u64
    }
}

// ---------------------------------------------------------------------------
// Uniform and binomial
// ---------------------------------------------------------------------------

/// Uniform draw from `{lo, .., hi - 1}`, requiring `lo < hi <= 2^width`.
pub fn sample_uniform<R: Rng>(rng: &mut R, width: u32, lo: u64, hi: u64) -> Result<u64> {
    if hi <= lo {
        return Err(DiceError::range(format!(
            "uniform bounds must satisfy lo < hi (got {} >= {})",
            lo, hi
        )));
    }
    let limit = if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    if hi - 1 > limit {
        return Err(DiceError::range(format!(
            "uniform upper bound {} does not fit in int({})",
            hi, width
        )));
    }
    Ok(rng.gen_range(lo..hi))
}

/// Sum of `n` independent Bernoulli(p) draws.
pub fn sample_binomial<R: Rng>(rng: &mut R, n: u64, p: f64) -> Result<u64> {
    check_probability(p)?;
    let mut successes = 0;
    for _ in 0..n {
        if rng.gen::<f64>() < p {
            successes += 1;
        }
    }
    Ok(successes)
}
