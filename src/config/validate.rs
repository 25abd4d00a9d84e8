//! Configuration validation
//!
//! Every check here runs at construction time so misconfigured layers fail
//! before any tensor is touched.

use super::schema::{Calibration, QuantizationConfig, SearchConfig, StaticBound, TensorRole};
use crate::error::{QuantError, Result};
use crate::utils::{bitwidth_to_range, symmetric_range, Granularity, QuantMode};

/// Widest bit width a config accepts; integers above 2^23 lose exactness in f32
pub const MAX_PRECISION: u8 = 23;

fn invalid(msg: impl Into<String>) -> QuantError {
    QuantError::InvalidConfig(msg.into())
}

/// Validate a quantization configuration
///
/// Checks:
/// - Bit width is supported for the mode
/// - Static bounds are finite, positive and sized for the granularity
/// - Search parameters are in range
/// - Stateful calibration is only used for activations
pub fn validate_config(config: &QuantizationConfig) -> Result<()> {
    let bits = config.bits();
    if bits > MAX_PRECISION {
        return Err(invalid(format!(
            "bit width {bits} exceeds {MAX_PRECISION}, float32 has less precision"
        )));
    }
    match config.mode() {
        QuantMode::Symmetric => symmetric_range(bits)?,
        QuantMode::Asymmetric => bitwidth_to_range(bits, true)?,
    };

    match config.calibration() {
        Calibration::Static { bound } => validate_static_bound(bound, config)?,
        Calibration::AbsMax => {}
        Calibration::Search(search) => validate_search(search)?,
        Calibration::MovingAverage { momentum } => {
            if !(momentum.is_finite() && *momentum > 0.0 && *momentum <= 1.0) {
                return Err(invalid(format!(
                    "moving average momentum {momentum} must be in (0, 1]"
                )));
            }
            if config.role() == TensorRole::Weight {
                return Err(invalid(
                    "moving average calibration is only valid for activations",
                ));
            }
        }
    }

    Ok(())
}

fn validate_static_bound(bound: &StaticBound, config: &QuantizationConfig) -> Result<()> {
    if bound.is_empty() {
        return Err(invalid("static bound must have at least one entry"));
    }
    if config.granularity() == Granularity::PerTensor && bound.len() != 1 {
        return Err(invalid(format!(
            "per-tensor static bound must have one entry, got {}",
            bound.len()
        )));
    }

    match bound {
        StaticBound::Symmetric(values) => {
            if let Some(bad) = values.iter().find(|b| !(b.is_finite() && **b > 0.0)) {
                return Err(invalid(format!(
                    "static bound {bad} must be finite and positive"
                )));
            }
        }
        StaticBound::Range { min, max } => {
            if config.mode() == QuantMode::Symmetric {
                return Err(invalid(
                    "a [min, max] static bound requires asymmetric mode",
                ));
            }
            if min.len() != max.len() {
                return Err(invalid(format!(
                    "static bound has {} minimums but {} maximums",
                    min.len(),
                    max.len()
                )));
            }
            for (lo, hi) in min.iter().zip(max.iter()) {
                if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                    return Err(invalid(format!(
                        "static range [{lo}, {hi}] must be finite with min < max"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<()> {
    if search.iteration_budget == 0 {
        return Err(invalid("search iteration budget must be > 0"));
    }
    if search.grid_points < 2 {
        return Err(invalid(format!(
            "search needs at least 2 grid points, got {}",
            search.grid_points
        )));
    }
    if !(search.min_ratio > 0.0 && search.min_ratio <= 1.0) {
        return Err(invalid(format!(
            "search min_ratio {} must be in (0, 1]",
            search.min_ratio
        )));
    }
    if !(search.tolerance.is_finite() && search.tolerance >= 0.0) {
        return Err(invalid(format!(
            "search tolerance {} must be finite and >= 0",
            search.tolerance
        )));
    }
    Ok(())
}
