//! Entry points a layer calls

use ndarray::{ArrayD, ArrayViewD};
use tracing::debug;

use super::einsum::einsum;
use super::quantized::{mixed_einsum, quantized_einsum};
use crate::aqt::{self, AqtState, QuantizedTensor};
use crate::config::{ExecutionPath, QuantizationConfig, QuantizationHParams};
use crate::error::{QuantError, Result};

/// Quantize with a fresh calibration state
///
/// Stateful calibrations see this tensor as their first observation.
pub fn quantize_tensor(
    tensor: ArrayViewD<'_, f32>,
    config: &QuantizationConfig,
) -> Result<QuantizedTensor> {
    aqt::quantize(tensor, config, &mut AqtState::new())
}

/// Quantized einsum of a layer's activation and weight
///
/// The computation follows [`QuantizationHParams::execution_path`]:
/// - `FakeQuant`: both operands quantize-dequantized, float contraction
/// - `Integer`: both operands quantized, integer contraction
/// - `WeightOnly`: float activation times quantized weight
///
/// `act_state` carries the activation's calibration statistics between
/// calls; weights are calibrated from scratch every call.
pub fn layer_einsum(
    equation: &str,
    activation: ArrayViewD<'_, f32>,
    weight: ArrayViewD<'_, f32>,
    hparams: &QuantizationHParams,
    act_state: &mut AqtState,
) -> Result<ArrayD<f32>> {
    let path = hparams.execution_path();
    let weight_config = hparams.weight_config()?;
    let act_config = hparams.act_config()?;
    debug!(equation, ?path, bits = weight_config.bits(), "layer einsum");

    match path {
        ExecutionPath::FakeQuant => {
            let weight = aqt::fake_quantize(weight, &weight_config, &mut AqtState::new())?;
            let activation = match &act_config {
                Some(config) => aqt::fake_quantize(activation, config, act_state)?,
                None => activation.to_owned(),
            };
            einsum(equation, activation.view(), weight.view())
        }
        ExecutionPath::Integer => {
            let config = act_config.ok_or_else(|| {
                QuantError::InvalidConfig("integer path needs activation params".into())
            })?;
            let activation = aqt::quantize(activation, &config, act_state)?;
            let weight = quantize_tensor(weight, &weight_config)?;
            quantized_einsum(equation, &activation, &weight)
        }
        ExecutionPath::WeightOnly => {
            let weight = quantize_tensor(weight, &weight_config)?;
            mixed_einsum(equation, activation, &weight)
        }
    }
}
