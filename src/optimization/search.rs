//! Deterministic clipping-bound search
//!
//! Each channel is searched over clipping ratios `c` applied to its observed
//! range: an evenly spaced grid over `[min_ratio, 1]` first, then a
//! golden-section refinement inside the grid cell around the best point.
//! Candidates are evaluated in a fixed order and ties keep the earlier
//! (larger) ratio, so identical inputs give bit-identical bounds.

use ndarray::{ArrayView1, ArrayViewD};
use rayon::prelude::*;
use tracing::{debug, trace};

use super::bound::{observed_range, ClippingBound};
use super::metric::{quantization_error, ErrorMetric};
use crate::config::{QuantizationConfig, SearchConfig};
use crate::error::Result;
use crate::utils::{reshape_for_granularity, QuantMode};

const INV_PHI: f32 = 0.618_034;

/// Result of searching one channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelSearch {
    /// Chosen clipping ratio relative to the observed range
    pub ratio: f32,
    /// Objective value at `ratio`
    pub error: f32,
    /// Number of objective evaluations spent
    pub evaluations: usize,
}

struct Objective<'a> {
    values: ArrayView1<'a, f32>,
    lo: f32,
    hi: f32,
    bits: u8,
    mode: QuantMode,
    metric: ErrorMetric,
    evaluations: usize,
    best: (f32, f32),
}

impl Objective<'_> {
    fn eval(&mut self, ratio: f32) -> Result<f32> {
        self.evaluations += 1;
        let error = quantization_error(
            self.values,
            ratio * self.lo,
            ratio * self.hi,
            self.bits,
            self.mode,
            self.metric,
        )?;
        trace!(ratio, error, "clipping candidate");
        if error < self.best.1 {
            self.best = (ratio, error);
        }
        Ok(error)
    }
}

/// Search the clipping ratio of one channel
///
/// `observed` is the channel's unclipped `(min, max)`. Never fails on
/// numeric grounds: an exhausted budget returns the best ratio seen.
pub fn search_channel(
    values: ArrayView1<'_, f32>,
    observed: (f32, f32),
    bits: u8,
    mode: QuantMode,
    search: &SearchConfig,
    metric: ErrorMetric,
) -> Result<ChannelSearch> {
    let mut objective = Objective {
        values,
        lo: observed.0,
        hi: observed.1,
        bits,
        mode,
        metric,
        evaluations: 0,
        best: (1.0, f32::INFINITY),
    };

    let budget = search.iteration_budget.max(1);
    let degenerate = observed.0 == 0.0 && observed.1 == 0.0;
    let n = if degenerate {
        1
    } else {
        search.grid_points.min(budget).max(1)
    };
    let step = if n > 1 {
        (1.0 - search.min_ratio) / (n - 1) as f32
    } else {
        0.0
    };

    let mut grid = Vec::with_capacity(n);
    let mut best_idx = 0;
    for i in 0..n {
        let ratio = 1.0 - i as f32 * step;
        let before = objective.best.1;
        objective.eval(ratio)?;
        if objective.best.1 < before {
            best_idx = i;
        }
        grid.push(ratio);
    }

    let mut left = budget - n;
    if left >= 2 && objective.best.1 > 0.0 {
        let mut a = grid.get(best_idx + 1).copied().unwrap_or(search.min_ratio);
        let mut b = if best_idx > 0 { grid[best_idx - 1] } else { 1.0 };
        let mut x1 = b - INV_PHI * (b - a);
        let mut x2 = a + INV_PHI * (b - a);
        let mut f1 = objective.eval(x1)?;
        let mut f2 = objective.eval(x2)?;
        left -= 2;

        while left > 0 {
            let flat = (f1 - f2).abs() <= search.tolerance * f1.max(f2);
            if flat || b - a <= f32::EPSILON {
                break;
            }
            if f1 <= f2 {
                b = x2;
                x2 = x1;
                f2 = f1;
                x1 = b - INV_PHI * (b - a);
                f1 = objective.eval(x1)?;
            } else {
                a = x1;
                x1 = x2;
                f1 = f2;
                x2 = a + INV_PHI * (b - a);
                f2 = objective.eval(x2)?;
            }
            left -= 1;
        }
    }

    let (ratio, error) = objective.best;
    Ok(ChannelSearch {
        ratio,
        error,
        evaluations: objective.evaluations,
    })
}

/// Find the clipping bound minimizing `metric` for `tensor`
///
/// Search parameters come from the config's `Calibration::Search` (defaults
/// otherwise). Per-channel granularity searches every channel
/// independently; channels run in parallel and are collected in order.
/// All-zero channels get the epsilon bound.
pub fn search_bound(
    tensor: ArrayViewD<'_, f32>,
    config: &QuantizationConfig,
    metric: ErrorMetric,
) -> Result<ClippingBound> {
    let search = config.search_config().copied().unwrap_or_default();
    let mode = config.mode();
    let bits = config.bits();

    let rows = reshape_for_granularity(tensor.view(), config.granularity())?;
    let channels: Vec<ArrayView1<'_, f32>> = rows.outer_iter().collect();

    let outcomes = channels
        .par_iter()
        .map(|row| {
            let observed = observed_range(row.view(), mode);
            search_channel(row.view(), observed, bits, mode, &search, metric)
                .map(|found| (observed, found))
        })
        .collect::<Result<Vec<_>>>()?;

    let evaluations: usize = outcomes.iter().map(|(_, found)| found.evaluations).sum();
    debug!(
        channels = outcomes.len(),
        evaluations,
        ?metric,
        "clipping bound search finished"
    );

    let ranges: Vec<(f32, f32)> = outcomes
        .iter()
        .map(|&((lo, hi), found)| (lo * found.ratio, hi * found.ratio))
        .collect();
    ClippingBound::from_ranges(&ranges, tensor.shape(), config.granularity(), mode)
}
