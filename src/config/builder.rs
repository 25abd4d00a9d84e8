//! Builder for `QuantizationConfig`

use super::schema::{Calibration, QuantizationConfig, TensorRole};
use crate::error::Result;
use crate::utils::{Granularity, QuantMode};

/// Step-by-step construction of a [`QuantizationConfig`]
///
/// Defaults: symmetric, per-tensor, max-abs calibration, weight role.
#[derive(Clone, Debug)]
pub struct QuantizationConfigBuilder {
    bits: u8,
    mode: QuantMode,
    granularity: Granularity,
    calibration: Calibration,
    role: TensorRole,
}

impl QuantizationConfigBuilder {
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            mode: QuantMode::default(),
            granularity: Granularity::default(),
            calibration: Calibration::default(),
            role: TensorRole::default(),
        }
    }

    pub fn mode(mut self, mode: QuantMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Shorthand for `granularity(Granularity::PerChannel { axis })`
    pub fn per_channel(self, axis: usize) -> Self {
        self.granularity(Granularity::PerChannel { axis })
    }

    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn role(mut self, role: TensorRole) -> Self {
        self.role = role;
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<QuantizationConfig> {
        QuantizationConfig::new(
            self.bits,
            self.mode,
            self.granularity,
            self.calibration,
            self.role,
        )
    }
}

impl QuantizationConfig {
    /// Start a builder for a `bits`-wide configuration
    pub fn builder(bits: u8) -> QuantizationConfigBuilder {
        QuantizationConfigBuilder::new(bits)
    }
}
