//! Per-tensor vs per-channel layout helpers
//!
//! Per-channel statistics are computed on a `[channels, elements]` matrix and
//! stored back in a keepdims layout (size 1 on every axis except the channel
//! axis) so they broadcast against the original tensor.

use ndarray::{Array2, ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};

/// Quantization granularity options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Single scale/zero-point for entire tensor
    #[default]
    PerTensor,
    /// Separate scale/zero-point for every index of `axis`
    PerChannel { axis: usize },
}

impl Granularity {
    /// Channel axis, if any
    pub fn axis(&self) -> Option<usize> {
        match self {
            Granularity::PerTensor => None,
            Granularity::PerChannel { axis } => Some(*axis),
        }
    }
}

/// Fail with `ShapeError` unless `axis < ndim`
pub fn check_axis(axis: usize, ndim: usize) -> Result<()> {
    if axis >= ndim {
        return Err(QuantError::ShapeError(format!(
            "axis {axis} out of bounds for tensor of rank {ndim}"
        )));
    }
    Ok(())
}

/// Keepdims shape of the scale/bound tensor for `shape`
pub fn channel_shape(shape: &[usize], granularity: Granularity) -> Result<Vec<usize>> {
    let mut out = vec![1; shape.len()];
    if let Granularity::PerChannel { axis } = granularity {
        check_axis(axis, shape.len())?;
        out[axis] = shape[axis];
    }
    Ok(out)
}

/// Reorganize `tensor` into `[channels, elements_per_channel]`
///
/// Per-tensor granularity yields a single row. Row `c` of a per-channel
/// result holds every element whose index along `axis` is `c`, in row-major
/// order of the remaining axes.
pub fn reshape_for_granularity(
    tensor: ArrayViewD<'_, f32>,
    granularity: Granularity,
) -> Result<Array2<f32>> {
    match granularity {
        Granularity::PerTensor => {
            let data: Vec<f32> = tensor.iter().copied().collect();
            let n = data.len();
            Array2::from_shape_vec((1, n), data).map_err(|e| QuantError::ShapeError(e.to_string()))
        }
        Granularity::PerChannel { axis } => {
            let ndim = tensor.ndim();
            check_axis(axis, ndim)?;

            let channels = tensor.shape()[axis];
            let per_channel = if channels == 0 {
                0
            } else {
                tensor.len() / channels
            };

            let mut order: Vec<usize> = (0..ndim).filter(|&d| d != axis).collect();
            order.insert(0, axis);
            let moved = tensor.permuted_axes(IxDyn(&order));
            let data: Vec<f32> = moved.iter().copied().collect();

            Array2::from_shape_vec((channels, per_channel), data)
                .map_err(|e| QuantError::ShapeError(e.to_string()))
        }
    }
}

/// Build a keepdims tensor from one value per channel
pub fn expand_channels(
    values: Vec<f32>,
    shape: &[usize],
    granularity: Granularity,
) -> Result<ArrayD<f32>> {
    let target = channel_shape(shape, granularity)?;
    let expected: usize = target.iter().product();
    if values.len() != expected {
        return Err(QuantError::ShapeMismatch {
            expected: target,
            got: vec![values.len()],
        });
    }
    ArrayD::from_shape_vec(IxDyn(&target), values).map_err(|e| QuantError::ShapeError(e.to_string()))
}
