use std::time::{Duration, Instant};

use thiserror::Error;

use crate::request::{NutrientRanges, PctRange};
use crate::table::{Composition, Nutrient};

/// Tolerance for the sum-to-100 filter and for grid membership
const SUM_TOLERANCE: f64 = 1e-6;
/// The mixture total, in percentage points
const TOTAL_PCT: f64 = 100.0;

/// Bounds on the grid search. The candidate space grows with the product of
/// every ingredient's range width over the step, so the ceiling is checked
/// before any enumeration starts and the deadline while it runs.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Grid granularity in percentage points
    pub step_pct: f64,
    /// Ceiling on the combination count; a larger grid is rejected outright
    pub max_candidates: u64,
    /// Wall-clock budget for the enumeration
    pub timeout: Option<Duration>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            step_pct: 1.0,
            max_candidates: 2_000_000,
            timeout: None,
        }
    }
}

/// The least-violating grid composition found
#[derive(Debug, Clone)]
pub struct GridSolution {
    /// Percentage share per selected ingredient, summing to 100
    pub shares_pct: Vec<f64>,
    /// Summed out-of-range distance across all nutrient totals; 0 means the
    /// composition actually satisfies every range
    pub penalty: f64,
    /// Candidates scored before settling on this one
    pub evaluated: u64,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("step must be a positive number of percentage points, got {0}")]
    InvalidStep(f64),
    /// The grid is too coarse or the ranges too narrow for any combination
    /// to reach 100
    #[error("no composition at step {step} sums to 100 within the given ranges")]
    NoCandidate { step: f64 },
    /// Rejected before enumeration; the caller may coarsen the step or
    /// narrow the ranges and retry
    #[error("{candidates} grid candidates exceed the ceiling of {limit}")]
    SpaceTooLarge { candidates: u128, limit: u64 },
    #[error("deadline expired after {evaluated} candidates")]
    DeadlineExpired { evaluated: u64 },
}

/// Exhaustive penalty-minimizing search over the discretized share space.
///
/// Each ingredient's grid starts at its own lower bound and steps upward;
/// the last ingredient takes the residual `100 - partial sum` and the
/// combination counts only if that residual lands on its grid. Ties on
/// penalty keep the first candidate in enumeration order, which makes the
/// result deterministic for a fixed selection order.
pub fn search(
    compositions: &[Composition],
    ingredient_ranges: &[PctRange],
    nutrient_ranges: &NutrientRanges,
    limits: &SearchLimits,
) -> Result<GridSolution, SearchError> {
    debug_assert_eq!(compositions.len(), ingredient_ranges.len());
    debug_assert!(!compositions.is_empty());

    let step = limits.step_pct;
    if !step.is_finite() || step <= 0.0 {
        return Err(SearchError::InvalidStep(step));
    }

    let grids: Vec<Grid> = ingredient_ranges.iter().map(|r| Grid::new(r, step)).collect();
    let n = grids.len();

    // Every combination visits one leaf per point of the first n-1 grids,
    // so this product bounds the enumeration exactly
    let mut candidates: u128 = 1;
    for grid in &grids[..n - 1] {
        candidates = candidates.saturating_mul(grid.count as u128);
    }
    if candidates > u128::from(limits.max_candidates) {
        return Err(SearchError::SpaceTooLarge {
            candidates,
            limit: limits.max_candidates,
        });
    }

    // Suffix sums of the reachable share range, for pruning
    let mut min_tail = vec![0.0; n + 1];
    let mut max_tail = vec![0.0; n + 1];
    for i in (0..n).rev() {
        min_tail[i] = min_tail[i + 1] + grids[i].low;
        max_tail[i] = max_tail[i + 1] + grids[i].high();
    }

    let mut searcher = Searcher {
        compositions,
        nutrient_ranges,
        grids: &grids,
        step,
        min_tail,
        max_tail,
        shares: vec![0.0; n],
        best: None,
        evaluated: 0,
        deadline: limits.timeout.map(|t| Instant::now() + t),
    };
    searcher.descend(0, 0.0)?;

    let evaluated = searcher.evaluated;
    searcher
        .best
        .map(|(shares_pct, penalty)| GridSolution {
            shares_pct,
            penalty,
            evaluated,
        })
        .ok_or(SearchError::NoCandidate { step })
}

struct Grid {
    low: f64,
    step: f64,
    count: usize,
}

impl Grid {
    fn new(range: &PctRange, step: f64) -> Self {
        let count = ((range.high() - range.low()) / step + SUM_TOLERANCE).floor() as usize + 1;
        Self {
            low: range.low(),
            step,
            count,
        }
    }

    fn value(&self, k: usize) -> f64 {
        self.low + k as f64 * self.step
    }

    fn high(&self) -> f64 {
        self.value(self.count - 1)
    }

    /// Grid index of `value`, if it lies on the grid within tolerance
    fn position(&self, value: f64) -> Option<usize> {
        let k = ((value - self.low) / self.step).round();
        if k < 0.0 || k as usize >= self.count {
            return None;
        }
        let k = k as usize;
        ((self.value(k) - value).abs() <= SUM_TOLERANCE).then_some(k)
    }
}

struct Searcher<'a> {
    compositions: &'a [Composition],
    nutrient_ranges: &'a NutrientRanges,
    grids: &'a [Grid],
    step: f64,
    min_tail: Vec<f64>,
    max_tail: Vec<f64>,
    shares: Vec<f64>,
    best: Option<(Vec<f64>, f64)>,
    evaluated: u64,
    deadline: Option<Instant>,
}

impl Searcher<'_> {
    fn descend(&mut self, depth: usize, sum: f64) -> Result<(), SearchError> {
        if depth == self.grids.len() - 1 {
            return self.score_leaf(sum);
        }

        let grid = &self.grids[depth];
        for k in 0..grid.count {
            let value = grid.value(k);
            let with = sum + value;
            // Values only grow; once the remaining minimum overshoots 100
            // no later k can work either
            if with + self.min_tail[depth + 1] > TOTAL_PCT + SUM_TOLERANCE {
                break;
            }
            if with + self.max_tail[depth + 1] < TOTAL_PCT - SUM_TOLERANCE {
                continue;
            }
            self.shares[depth] = value;
            self.descend(depth + 1, with)?;
        }
        Ok(())
    }

    /// The last ingredient is pinned by the residual; score the candidate if
    /// the residual lands on its grid
    fn score_leaf(&mut self, sum: f64) -> Result<(), SearchError> {
        let last = self.grids.len() - 1;
        let residual = TOTAL_PCT - sum;
        if self.grids[last].position(residual).is_none() {
            return Ok(());
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SearchError::DeadlineExpired {
                    evaluated: self.evaluated,
                });
            }
        }

        self.shares[last] = residual;
        self.evaluated += 1;

        let mut penalty = 0.0;
        for nutrient in Nutrient::ALL {
            let total_pct: f64 = self
                .shares
                .iter()
                .zip(self.compositions)
                .map(|(share, composition)| share * composition.known_or_zero(nutrient))
                .sum();
            penalty += self.nutrient_ranges.get(nutrient).distance_outside(total_pct);
        }

        // Strict comparison keeps the first-found candidate on ties
        if self.best.as_ref().is_none_or(|(_, best)| penalty < *best) {
            self.best = Some((self.shares.clone(), penalty));
        }
        Ok(())
    }
}
