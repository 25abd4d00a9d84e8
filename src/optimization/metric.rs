//! Reconstruction error objectives

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::{AffineParams, QuantMode};

/// Error between a tensor and its quantized reconstruction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    /// Mean squared error
    #[default]
    Mse,
    /// Mean absolute error
    Mae,
    /// Maximum absolute error
    MaxAbs,
}

impl ErrorMetric {
    /// Score element-wise errors; accumulation is in f64 and in input order
    pub fn score(&self, errors: impl Iterator<Item = f32>) -> f32 {
        let mut count = 0usize;
        let mut acc = 0.0f64;
        for e in errors {
            let e = e.abs() as f64;
            count += 1;
            acc = match self {
                ErrorMetric::Mse => acc + e * e,
                ErrorMetric::Mae => acc + e,
                ErrorMetric::MaxAbs => acc.max(e),
            };
        }
        if count == 0 {
            return 0.0;
        }
        match self {
            ErrorMetric::Mse | ErrorMetric::Mae => (acc / count as f64) as f32,
            ErrorMetric::MaxAbs => acc as f32,
        }
    }
}

/// Error of quantizing `values` with clipping range `[min, max]`
pub fn quantization_error(
    values: ArrayView1<'_, f32>,
    min: f32,
    max: f32,
    bits: u8,
    mode: QuantMode,
    metric: ErrorMetric,
) -> Result<f32> {
    let params = AffineParams::from_bound(min, max, bits, mode)?;
    Ok(metric.score(values.iter().map(|&x| params.fake_quantize(x) - x)))
}
