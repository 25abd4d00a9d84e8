//! Integer-operand einsum and matmul
//!
//! Operands are contracted on their centered integers (`values -
//! zero_point`) in an `i64` accumulator. The float result is produced by a
//! single rescale afterwards, multiplying by the broadcast product of both
//! scales, so no per-element scaling happens inside the contraction.

use ndarray::{ArrayD, ArrayViewD, Zip};
use tracing::{trace, warn};

use super::einsum::{EinsumPlan, Operand};
use crate::aqt::QuantizedTensor;
use crate::error::{QuantError, Result};

/// Reject contractions whose worst case does not fit the `i64` accumulator
///
/// The bound is `lhs_max * rhs_max * contraction`, evaluated in `i128`.
pub fn check_accumulator(contraction: usize, lhs_max: i64, rhs_max: i64) -> Result<()> {
    let worst = lhs_max as i128 * rhs_max as i128 * contraction as i128;
    if worst > i64::MAX as i128 {
        warn!(
            contraction,
            lhs_max, rhs_max, "integer contraction could overflow the accumulator"
        );
        return Err(QuantError::AccumulatorOverflow {
            contraction,
            lhs_max,
            rhs_max,
        });
    }
    Ok(())
}

/// Scales of both operands, each laid out like the output
fn output_scales(
    plan: &EinsumPlan,
    lhs_scale: ArrayViewD<'_, f32>,
    rhs_scale: ArrayViewD<'_, f32>,
) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
    Ok((
        plan.map_to_output(Operand::Lhs, lhs_scale)?,
        plan.map_to_output(Operand::Rhs, rhs_scale)?,
    ))
}

/// Einsum of two quantized tensors, rescaled to float
///
/// Equivalent up to quantization error to the float einsum of
/// `dequantize(lhs)` and `dequantize(rhs)`. Per-channel scales must vary
/// only along axes that survive into the output.
pub fn quantized_einsum(
    equation: &str,
    lhs: &QuantizedTensor,
    rhs: &QuantizedTensor,
) -> Result<ArrayD<f32>> {
    let plan = EinsumPlan::new(equation, lhs.shape(), rhs.shape())?;
    let (lhs_scale, rhs_scale) = output_scales(&plan, lhs.scale().view(), rhs.scale().view())?;
    check_accumulator(
        plan.contraction_size(),
        lhs.max_abs_centered(),
        rhs.max_abs_centered(),
    )?;

    let acc = plan.execute(lhs.centered().view(), rhs.centered().view())?;
    trace!(equation, shape = ?acc.shape(), "integer contraction done");

    Ok(Zip::from(&acc)
        .and_broadcast(&lhs_scale)
        .and_broadcast(&rhs_scale)
        .map_collect(|&a, &ls, &rs| a as f32 * (ls * rs)))
}

/// `lhs [..., K]` times `rhs [K, N]` on quantized operands
pub fn quantized_matmul(lhs: &QuantizedTensor, rhs: &QuantizedTensor) -> Result<ArrayD<f32>> {
    if rhs.ndim() != 2 || lhs.ndim() == 0 {
        return Err(QuantError::ShapeError(format!(
            "matmul needs lhs [..., K] and rhs [K, N], got {:?} and {:?}",
            lhs.shape(),
            rhs.shape()
        )));
    }
    quantized_einsum("...k,kn->...n", lhs, rhs)
}

/// Einsum of a float activation and a quantized weight
///
/// The weight's centered integers are contracted in float and the result
/// is rescaled once by the weight scale.
pub fn mixed_einsum(
    equation: &str,
    activation: ArrayViewD<'_, f32>,
    weight: &QuantizedTensor,
) -> Result<ArrayD<f32>> {
    let plan = EinsumPlan::new(equation, activation.shape(), weight.shape())?;
    let weight_scale = plan.map_to_output(Operand::Rhs, weight.scale().view())?;
    let weight_ints = weight.centered().mapv(|v| v as f32);

    let acc = plan.execute(activation, weight_ints.view())?;
    Ok(Zip::from(&acc)
        .and_broadcast(&weight_scale)
        .map_collect(|&a, &s| a * s))
}
