//! Declarative quantization hyperparameters
//!
//! Plain serde records a layer is configured with. They carry no logic
//! beyond conversion into validated [`QuantizationConfig`]s and the choice
//! of execution path.
//!
//! # Example
//!
//! ```yaml
//! quantization_type: aqt
//! mode: inference
//! weight_params:
//!   precision: 4
//!   channel_axis: 1
//!   min_clipping: 0.6
//!   num_optimize_clipping: 9
//! act_params:
//!   precision: 8
//!   calibration:
//!     strategy: moving_average
//!     momentum: 0.1
//! ```

use serde::{Deserialize, Serialize};

use super::schema::{Calibration, QuantizationConfig, SearchConfig, TensorRole};
use crate::error::{QuantError, Result};
use crate::utils::{Granularity, QuantMode};

/// Quantization scheme applied to a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationType {
    /// Post-training quantization
    #[default]
    Ptq,
    /// Fake quantization: quantize-dequantize, compute in float
    Fq,
    /// Accurate quantized training: integer compute on both operands
    Aqt,
}

/// Lifecycle stage of the layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    Training,
    /// Weights are being converted to their stored integer form
    ///
    /// Dispatches like `Inference`: the einsum runs on quantized weights.
    Materialize,
    #[default]
    Inference,
}

/// How a quantized einsum is computed for a given set of hyperparameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Float einsum over quantize-dequantized operands
    FakeQuant,
    /// Integer einsum over quantized activation and weight
    Integer,
    /// Float activation times quantized weight
    WeightOnly,
}

fn mode_for(symmetric: bool) -> QuantMode {
    if symmetric {
        QuantMode::Symmetric
    } else {
        QuantMode::Asymmetric
    }
}

fn granularity_for(channel_axis: Option<usize>) -> Granularity {
    channel_axis.map_or(Granularity::PerTensor, |axis| Granularity::PerChannel { axis })
}

/// Weight quantization parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightQuantizationParams {
    /// Number of bits to quantize to (e.g. 4 for int4)
    pub precision: u8,
    pub use_symmetric: bool,
    /// Output channel axis; `None` quantizes per tensor
    pub channel_axis: Option<usize>,
    pub calibration: Calibration,
    /// Smallest clipping ratio to try; setting it enables the bound search
    pub min_clipping: Option<f32>,
    /// Number of clipping ratios to try; setting it enables the bound search
    pub num_optimize_clipping: Option<usize>,
}

impl Default for WeightQuantizationParams {
    fn default() -> Self {
        Self {
            precision: 8,
            use_symmetric: true,
            channel_axis: None,
            calibration: Calibration::AbsMax,
            min_clipping: None,
            num_optimize_clipping: None,
        }
    }
}

impl WeightQuantizationParams {
    fn effective_calibration(&self) -> Calibration {
        if self.min_clipping.is_none() && self.num_optimize_clipping.is_none() {
            return self.calibration.clone();
        }

        let mut search = match &self.calibration {
            Calibration::Search(search) => *search,
            _ => SearchConfig::default(),
        };
        if let Some(min_clipping) = self.min_clipping {
            search.min_ratio = min_clipping;
        }
        if let Some(points) = self.num_optimize_clipping {
            search.grid_points = points;
            search.iteration_budget = search.iteration_budget.max(points);
        }
        Calibration::Search(search)
    }
}

impl TryFrom<&WeightQuantizationParams> for QuantizationConfig {
    type Error = QuantError;

    fn try_from(params: &WeightQuantizationParams) -> Result<Self> {
        QuantizationConfig::builder(params.precision)
            .mode(mode_for(params.use_symmetric))
            .granularity(granularity_for(params.channel_axis))
            .calibration(params.effective_calibration())
            .role(TensorRole::Weight)
            .build()
    }
}

/// Activation quantization parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActQuantizationParams {
    /// Number of bits; `None` leaves activations in float
    pub precision: Option<u8>,
    pub symmetric: bool,
    pub channel_axis: Option<usize>,
    pub calibration: Calibration,
}

impl Default for ActQuantizationParams {
    fn default() -> Self {
        Self {
            precision: Some(8),
            symmetric: true,
            channel_axis: None,
            calibration: Calibration::AbsMax,
        }
    }
}

impl TryFrom<&ActQuantizationParams> for QuantizationConfig {
    type Error = QuantError;

    fn try_from(params: &ActQuantizationParams) -> Result<Self> {
        let bits = params.precision.ok_or_else(|| {
            QuantError::InvalidConfig("activation quantization is disabled (no precision)".into())
        })?;
        QuantizationConfig::builder(bits)
            .mode(mode_for(params.symmetric))
            .granularity(granularity_for(params.channel_axis))
            .calibration(params.calibration.clone())
            .role(TensorRole::Activation)
            .build()
    }
}

/// Complete quantization hyperparameters of a layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuantizationHParams {
    pub quantization_type: QuantizationType,
    pub mode: QuantizationMode,
    pub weight_params: WeightQuantizationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act_params: Option<ActQuantizationParams>,
}

impl QuantizationHParams {
    /// Parse hyperparameters from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validated weight configuration
    pub fn weight_config(&self) -> Result<QuantizationConfig> {
        QuantizationConfig::try_from(&self.weight_params)
    }

    /// Validated activation configuration, `None` if activations stay float
    pub fn act_config(&self) -> Result<Option<QuantizationConfig>> {
        match &self.act_params {
            Some(params) if params.precision.is_some() => {
                QuantizationConfig::try_from(params).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Execution path implied by type, mode and activation params
    pub fn execution_path(&self) -> ExecutionPath {
        let quantized_acts = self
            .act_params
            .as_ref()
            .is_some_and(|p| p.precision.is_some());

        match (self.quantization_type, self.mode) {
            (QuantizationType::Fq, _) | (QuantizationType::Ptq, QuantizationMode::Training) => {
                ExecutionPath::FakeQuant
            }
            _ if quantized_acts => ExecutionPath::Integer,
            _ => ExecutionPath::WeightOnly,
        }
    }
}
