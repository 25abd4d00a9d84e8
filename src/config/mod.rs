//! Quantization configuration
//!
//! - **schema**: the validated, immutable `QuantizationConfig`
//! - **builder**: step-by-step construction
//! - **validate**: construction-time checks
//! - **hparams**: declarative (YAML) hyperparameter records

mod builder;
mod hparams;
mod schema;
mod validate;


pub use builder::QuantizationConfigBuilder;
pub use hparams::{
    ActQuantizationParams, ExecutionPath, QuantizationHParams, QuantizationMode,
    QuantizationType, WeightQuantizationParams,
};
pub use schema::{Calibration, QuantizationConfig, SearchConfig, StaticBound, TensorRole};
pub use validate::{validate_config, MAX_PRECISION};
