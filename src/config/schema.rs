//! Quantization configuration schema
//!
//! `QuantizationConfig` is immutable once built: every constructor runs
//! [`validate_config`](super::validate_config) and the fields are private.

use serde::{Deserialize, Serialize};

use super::validate::validate_config;
use crate::error::Result;
use crate::optimization::ErrorMetric;
use crate::utils::{Granularity, QuantMode};

/// Which kind of tensor a config quantizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TensorRole {
    /// Layer weights: calibrated from the tensor itself, never stateful
    #[default]
    Weight,
    /// Layer inputs/outputs: may keep running statistics across calls
    Activation,
}

/// Preset clipping bound, one entry per channel (or a single entry)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticBound {
    /// `[-bound, bound]`
    Symmetric(Vec<f32>),
    /// `[min, max]`, asymmetric mode only
    Range { min: Vec<f32>, max: Vec<f32> },
}

impl StaticBound {
    /// Number of channels the bound covers
    pub fn len(&self) -> usize {
        match self {
            StaticBound::Symmetric(bound) => bound.len(),
            StaticBound::Range { min, .. } => min.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(min, max)` of every channel
    pub fn ranges(&self) -> Vec<(f32, f32)> {
        match self {
            StaticBound::Symmetric(bound) => bound.iter().map(|&b| (-b, b)).collect(),
            StaticBound::Range { min, max } => {
                min.iter().copied().zip(max.iter().copied()).collect()
            }
        }
    }
}

/// Parameters of the error-minimizing clipping search
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Objective minimized by the search
    pub metric: ErrorMetric,
    /// Maximum number of objective evaluations per channel
    pub iteration_budget: usize,
    /// Stop refining once candidates differ by less than this fraction
    pub tolerance: f32,
    /// Smallest clipping ratio (relative to the observed range) considered
    pub min_ratio: f32,
    /// Number of evenly spaced ratios in `[min_ratio, 1]` scanned first
    pub grid_points: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            metric: ErrorMetric::Mse,
            iteration_budget: 32,
            tolerance: 1e-4,
            min_ratio: 0.5,
            grid_points: 11,
        }
    }
}

/// How the clipping bound is chosen
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Calibration {
    /// Fixed bound given up front
    Static { bound: StaticBound },
    /// Observed max-abs (symmetric) or min/max (asymmetric) of each call
    #[default]
    AbsMax,
    /// Error-minimizing search over clipping ratios
    Search(SearchConfig),
    /// Exponential moving average of observed bounds, kept in `AqtState`
    MovingAverage { momentum: f32 },
}

impl Calibration {
    /// Whether quantizing reads and writes `AqtState`
    pub fn is_stateful(&self) -> bool {
        matches!(self, Calibration::MovingAverage { .. })
    }
}

/// Validated quantization configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuantizationConfig {
    bits: u8,
    mode: QuantMode,
    granularity: Granularity,
    calibration: Calibration,
    role: TensorRole,
}

impl QuantizationConfig {
    /// Create and validate a configuration
    pub fn new(
        bits: u8,
        mode: QuantMode,
        granularity: Granularity,
        calibration: Calibration,
        role: TensorRole,
    ) -> Result<Self> {
        let config = Self {
            bits,
            mode,
            granularity,
            calibration,
            role,
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// Per-tensor symmetric weight config with max-abs calibration
    pub fn symmetric(bits: u8) -> Result<Self> {
        Self::new(
            bits,
            QuantMode::Symmetric,
            Granularity::PerTensor,
            Calibration::AbsMax,
            TensorRole::Weight,
        )
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn role(&self) -> TensorRole {
        self.role
    }

    /// Search parameters, if the calibration is a search
    pub fn search_config(&self) -> Option<&SearchConfig> {
        match &self.calibration {
            Calibration::Search(search) => Some(search),
            _ => None,
        }
    }
}
