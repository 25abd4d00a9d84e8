//! # Cuantizar: Quantization Primitives for Neural-Network Layers
//!
//! Cuantizar converts float weights and activations into low-bit integers
//! with per-tensor or per-channel scales, contracts quantized operands with
//! integer accumulation, and searches for clipping bounds that minimize
//! quantization error.
//!
//! ## Architecture
//!
//! - **utils**: Integer ranges, rounding, channel layouts and int4 packing
//! - **config**: Validated quantization configs and declarative hyperparameters
//! - **optimization**: Error metrics and deterministic clipping-bound search
//! - **aqt**: Quantize/dequantize controller with explicit calibration state
//! - **operations**: Quantized einsum/matmul kernels and the layer dispatcher
//!
//! ## Example
//!
//! ```
//! use cuantizar::{quantize_tensor, quantized_matmul, QuantizationConfig};
//! use ndarray::array;
//!
//! let config = QuantizationConfig::symmetric(8)?;
//! let a = quantize_tensor(array![[1.0f32, -2.0], [0.5, 3.0]].into_dyn().view(), &config)?;
//! let b = quantize_tensor(array![[1.0f32], [1.0]].into_dyn().view(), &config)?;
//! let product = quantized_matmul(&a, &b)?;
//! assert_eq!(product.shape(), &[2, 1]);
//! # Ok::<(), cuantizar::QuantError>(())
//! ```

pub mod aqt;
pub mod config;
pub mod operations;
pub mod optimization;
pub mod utils;

pub mod error;

// Re-export commonly used types
pub use aqt::{dequantize, quantize, AqtState, QuantizedTensor, TensorQuantizer};
pub use config::{
    Calibration, QuantizationConfig, QuantizationHParams, QuantizationMode, QuantizationType,
    TensorRole,
};
pub use error::{QuantError, Result};
pub use operations::{layer_einsum, quantize_tensor, quantized_einsum, quantized_matmul};
pub use optimization::{search_bound, ClippingBound, ErrorMetric};
pub use utils::{Granularity, QuantMode};
