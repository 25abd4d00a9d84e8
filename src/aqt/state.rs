//! Calibration state threaded through successive quantize calls

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::optimization::ClippingBound;

/// Running calibration statistics of one quantized tensor
///
/// Owned by the caller and passed by `&mut` into stateful calibration; a
/// fresh state holds no estimate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AqtState {
    running_bound: Option<ClippingBound>,
    steps: u64,
}

impl AqtState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bound estimate, if any batch has been observed
    pub fn running_bound(&self) -> Option<&ClippingBound> {
        self.running_bound.as_ref()
    }

    /// Number of observed batches
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn has_data(&self) -> bool {
        self.running_bound.is_some()
    }

    /// Fold an observed bound into the moving average and return the estimate
    ///
    /// The first observation initializes the estimate. Later ones blend as
    /// `running * (1 - momentum) + observed * momentum` and must keep the
    /// same shape (`ShapeMismatch` otherwise, leaving the state untouched).
    pub fn observe(&mut self, observed: ClippingBound, momentum: f32) -> Result<&ClippingBound> {
        let next = match &self.running_bound {
            Some(running) => running.blend(&observed, momentum)?,
            None => observed,
        };
        self.steps += 1;
        debug!(steps = self.steps, momentum, "updated running clipping bound");
        let running: &ClippingBound = self.running_bound.insert(next);
        Ok(running)
    }

    pub fn reset(&mut self) {
        self.running_bound = None;
        self.steps = 0;
    }
}
