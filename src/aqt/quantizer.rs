//! Quantize / dequantize entry points

use ndarray::{ArrayD, ArrayViewD, IxDyn, Zip};
use tracing::{debug, trace};

use super::state::AqtState;
use super::tensor::{mode_range, QuantizedTensor};
use crate::config::{Calibration, QuantizationConfig, QuantizationHParams};
use crate::error::{QuantError, Result};
use crate::optimization::{observed_bound, search_bound, ClippingBound};
use crate::utils::{channel_shape, expand_channels, round_and_clip, AffineParams, QuantMode};

/// Pick the clipping bound the config's calibration asks for
///
/// Only `MovingAverage` reads or writes `state`. Calibrations that observe
/// the tensor reject NaN or infinite values before touching the state.
pub fn select_bound(
    tensor: ArrayViewD<'_, f32>,
    config: &QuantizationConfig,
    state: &mut AqtState,
) -> Result<ClippingBound> {
    let granularity = config.granularity();
    let mode = config.mode();
    if !matches!(config.calibration(), Calibration::Static { .. }) {
        check_finite(tensor.view())?;
    }
    match config.calibration() {
        Calibration::Static { bound } => {
            let expected = channel_shape(tensor.shape(), granularity)?;
            let channels: usize = expected.iter().product();
            if bound.len() != channels {
                return Err(QuantError::ShapeMismatch {
                    expected,
                    got: vec![bound.len()],
                });
            }
            ClippingBound::from_ranges(&bound.ranges(), tensor.shape(), granularity, mode)
        }
        Calibration::AbsMax => observed_bound(tensor, granularity, mode),
        Calibration::Search(search) => search_bound(tensor, config, search.metric),
        Calibration::MovingAverage { momentum } => {
            let observed = observed_bound(tensor, granularity, mode)?;
            Ok(state.observe(observed, *momentum)?.clone())
        }
    }
}

fn check_finite(tensor: ArrayViewD<'_, f32>) -> Result<()> {
    let count = tensor.iter().filter(|v| !v.is_finite()).count();
    if count > 0 {
        return Err(QuantError::NonFiniteInput {
            count,
            len: tensor.len(),
        });
    }
    Ok(())
}

/// Quantize `tensor` with an explicit clipping bound
///
/// The bound must have the keepdims channel shape of `tensor` under the
/// config's granularity, and the config's mode.
pub fn quantize_with_bound(
    tensor: ArrayViewD<'_, f32>,
    bound: &ClippingBound,
    config: &QuantizationConfig,
) -> Result<QuantizedTensor> {
    let granularity = config.granularity();
    let mode = config.mode();
    let bits = config.bits();

    let expected = channel_shape(tensor.shape(), granularity)?;
    if bound.shape() != expected.as_slice() {
        return Err(QuantError::ShapeMismatch {
            expected,
            got: bound.shape().to_vec(),
        });
    }
    if bound.mode() != mode {
        return Err(QuantError::InvalidConfig(format!(
            "{:?} bound used with a {mode:?} config",
            bound.mode()
        )));
    }

    let params = bound
        .ranges()
        .into_iter()
        .map(|(lo, hi)| AffineParams::from_bound(lo, hi, bits, mode))
        .collect::<Result<Vec<_>>>()?;
    let scale = expand_channels(params.iter().map(|p| p.scale).collect(), tensor.shape(), granularity)?;

    let (values, zero_point) = match mode {
        QuantMode::Symmetric => {
            let range = mode_range(bits, mode)?;
            let scaled = Zip::from(&tensor)
                .and_broadcast(&scale)
                .map_collect(|&x, &s| x / s);
            (round_and_clip(scaled.view(), range.min_int, range.max_int)?, None)
        }
        QuantMode::Asymmetric => {
            let per_channel = ArrayD::from_shape_vec(IxDyn(&expected), params)
                .map_err(|e| QuantError::ShapeError(e.to_string()))?;
            let values = Zip::from(&tensor)
                .and_broadcast(&per_channel)
                .map_collect(|&x, p| p.quantize(x));
            (values, Some(per_channel.mapv(|p| p.zero_point)))
        }
    };

    trace!(bits, ?mode, channels = scale.len(), "quantized tensor");
    QuantizedTensor::new(values, scale, zero_point, bits, mode)
}

/// Quantize `tensor` according to `config`
///
/// Stateless calibrations leave `state` untouched.
pub fn quantize(
    tensor: ArrayViewD<'_, f32>,
    config: &QuantizationConfig,
    state: &mut AqtState,
) -> Result<QuantizedTensor> {
    let bound = select_bound(tensor.view(), config, state)?;
    quantize_with_bound(tensor, &bound, config)
}

/// Reconstruct the float tensor: `(values - zero_point) * scale`
pub fn dequantize(quantized: &QuantizedTensor) -> ArrayD<f32> {
    quantized.dequantize()
}

/// Quantize then dequantize
pub fn fake_quantize(
    tensor: ArrayViewD<'_, f32>,
    config: &QuantizationConfig,
    state: &mut AqtState,
) -> Result<ArrayD<f32>> {
    Ok(quantize(tensor, config, state)?.dequantize())
}

/// Named quantizer a layer owns for one of its tensors
///
/// Holds the config and the calibration state that persists across calls.
/// A quantizer without a config is disabled: fake quantization passes the
/// tensor through unchanged.
#[derive(Clone, Debug)]
pub struct TensorQuantizer {
    name: String,
    config: Option<QuantizationConfig>,
    state: AqtState,
}

impl TensorQuantizer {
    pub fn new(name: impl Into<String>, config: QuantizationConfig) -> Self {
        Self {
            name: name.into(),
            config: Some(config),
            state: AqtState::new(),
        }
    }

    /// Pass-through quantizer
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
            state: AqtState::new(),
        }
    }

    /// Quantizer for a layer's weight
    pub fn for_weight(name: impl Into<String>, hparams: &QuantizationHParams) -> Result<Self> {
        Ok(Self::new(name, hparams.weight_config()?))
    }

    /// Quantizer for a layer's activation; disabled without activation params
    pub fn for_activation(name: impl Into<String>, hparams: &QuantizationHParams) -> Result<Self> {
        Ok(match hparams.act_config()? {
            Some(config) => Self::new(name, config),
            None => Self::disabled(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<&QuantizationConfig> {
        self.config.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub fn state(&self) -> &AqtState {
        &self.state
    }

    /// Quantize to integers; fails on a disabled quantizer
    pub fn quantize(&mut self, tensor: ArrayViewD<'_, f32>) -> Result<QuantizedTensor> {
        let config = self.config.as_ref().ok_or_else(|| {
            QuantError::InvalidConfig(format!("quantizer '{}' is disabled", self.name))
        })?;
        quantize(tensor, config, &mut self.state)
    }

    /// Quantize-dequantize, or copy the tensor when disabled
    pub fn fake_quantize(&mut self, tensor: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        match &self.config {
            Some(config) => fake_quantize(tensor, config, &mut self.state),
            None => {
                debug!(name = %self.name, "quantizer disabled, passing through");
                Ok(tensor.to_owned())
            }
        }
    }

    /// Drop accumulated calibration statistics
    pub fn reset(&mut self) {
        self.state.reset();
    }
}
