//! Float einsum over fake-quantized operands

use ndarray::{ArrayD, ArrayViewD};

use super::einsum::einsum;
use crate::aqt::TensorQuantizer;
use crate::error::Result;

/// Quantize-dequantize both operands, then contract in float
///
/// Disabled quantizers pass their operand through unchanged. Stateful
/// quantizers update their calibration state.
pub fn fakequant_einsum(
    equation: &str,
    lhs: ArrayViewD<'_, f32>,
    rhs: ArrayViewD<'_, f32>,
    lhs_quantizer: &mut TensorQuantizer,
    rhs_quantizer: &mut TensorQuantizer,
) -> Result<ArrayD<f32>> {
    let lhs = lhs_quantizer.fake_quantize(lhs)?;
    let rhs = rhs_quantizer.fake_quantize(rhs)?;
    einsum(equation, lhs.view(), rhs.view())
}
