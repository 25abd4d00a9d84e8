//! Clipping bounds

use ndarray::{ArrayD, ArrayView1, ArrayViewD, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};
use crate::utils::{expand_channels, reshape_for_granularity, Granularity, QuantMode, MIN_BOUND};

/// Range mapped onto the integer grid, stored keepdims like the scale
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClippingBound {
    /// `[-bound, bound]` per channel
    Symmetric(ArrayD<f32>),
    /// `[min, max]` per channel
    Asymmetric { min: ArrayD<f32>, max: ArrayD<f32> },
}

fn floor_range(lo: f32, hi: f32) -> (f32, f32) {
    let lo = lo.min(0.0);
    let hi = hi.max(0.0);
    if hi - lo < MIN_BOUND {
        (lo, lo + MIN_BOUND)
    } else {
        (lo, hi)
    }
}

impl ClippingBound {
    /// Build a bound from one `(min, max)` pair per channel
    ///
    /// Symmetric bounds become `max(|min|, |max|)`; every bound is floored at
    /// [`MIN_BOUND`] so downstream scales stay strictly positive.
    pub fn from_ranges(
        ranges: &[(f32, f32)],
        shape: &[usize],
        granularity: Granularity,
        mode: QuantMode,
    ) -> Result<Self> {
        match mode {
            QuantMode::Symmetric => {
                let bounds = ranges
                    .iter()
                    .map(|&(lo, hi)| lo.abs().max(hi.abs()).max(MIN_BOUND))
                    .collect();
                Ok(ClippingBound::Symmetric(expand_channels(bounds, shape, granularity)?))
            }
            QuantMode::Asymmetric => {
                let (mins, maxs): (Vec<f32>, Vec<f32>) =
                    ranges.iter().map(|&(lo, hi)| floor_range(lo, hi)).unzip();
                Ok(ClippingBound::Asymmetric {
                    min: expand_channels(mins, shape, granularity)?,
                    max: expand_channels(maxs, shape, granularity)?,
                })
            }
        }
    }

    /// Keepdims shape of the bound
    pub fn shape(&self) -> &[usize] {
        match self {
            ClippingBound::Symmetric(bound) => bound.shape(),
            ClippingBound::Asymmetric { min, .. } => min.shape(),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn mode(&self) -> QuantMode {
        match self {
            ClippingBound::Symmetric(_) => QuantMode::Symmetric,
            ClippingBound::Asymmetric { .. } => QuantMode::Asymmetric,
        }
    }

    /// `(min, max)` of every channel, in channel order
    pub fn ranges(&self) -> Vec<(f32, f32)> {
        match self {
            ClippingBound::Symmetric(bound) => bound.iter().map(|&b| (-b, b)).collect(),
            ClippingBound::Asymmetric { min, max } => {
                min.iter().copied().zip(max.iter().copied()).collect()
            }
        }
    }

    /// `self * (1 - momentum) + observed * momentum`, element-wise
    pub fn blend(&self, observed: &ClippingBound, momentum: f32) -> Result<ClippingBound> {
        if self.shape() != observed.shape() {
            return Err(QuantError::ShapeMismatch {
                expected: self.shape().to_vec(),
                got: observed.shape().to_vec(),
            });
        }
        let ema = |old: &ArrayD<f32>, new: &ArrayD<f32>| {
            Zip::from(old)
                .and(new)
                .map_collect(|&o, &n| o * (1.0 - momentum) + n * momentum)
        };
        match (self, observed) {
            (ClippingBound::Symmetric(old), ClippingBound::Symmetric(new)) => {
                Ok(ClippingBound::Symmetric(ema(old, new)))
            }
            (
                ClippingBound::Asymmetric { min, max },
                ClippingBound::Asymmetric {
                    min: new_min,
                    max: new_max,
                },
            ) => Ok(ClippingBound::Asymmetric {
                min: ema(min, new_min),
                max: ema(max, new_max),
            }),
            _ => Err(QuantError::InvalidConfig(
                "cannot blend symmetric and asymmetric bounds".into(),
            )),
        }
    }
}

/// Observed `(min, max)` of one channel; symmetric mode mirrors the max-abs
pub(crate) fn observed_range(values: ArrayView1<'_, f32>, mode: QuantMode) -> (f32, f32) {
    match mode {
        QuantMode::Symmetric => {
            let max_abs = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            (-max_abs, max_abs)
        }
        QuantMode::Asymmetric => {
            let (lo, hi) = values
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if lo > hi {
                (0.0, 0.0)
            } else {
                (lo, hi)
            }
        }
    }
}

/// Bound covering the observed range of every channel, without clipping
pub fn observed_bound(
    tensor: ArrayViewD<'_, f32>,
    granularity: Granularity,
    mode: QuantMode,
) -> Result<ClippingBound> {
    let rows = reshape_for_granularity(tensor.view(), granularity)?;
    let ranges: Vec<(f32, f32)> = rows
        .outer_iter()
        .map(|row| observed_range(row, mode))
        .collect();
    ClippingBound::from_ranges(&ranges, tensor.shape(), granularity, mode)
}
