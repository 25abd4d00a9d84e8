//! Accurate quantized training (AQT) controller
//!
//! Decides how a tensor is quantized from its [`QuantizationConfig`]:
//! - **Static** calibration uses the preset bound
//! - **AbsMax** uses the observed range of every call
//! - **Search** runs the clipping search in [`crate::optimization`]
//! - **MovingAverage** threads running statistics through an [`AqtState`]
//!
//! Scale is `bound / max_int` per channel; values are rounded half to even
//! and clipped to the integer range of the bit width.
//!
//! [`QuantizationConfig`]: crate::config::QuantizationConfig

mod quantizer;
mod state;
mod tensor;


pub use quantizer::{
    dequantize, fake_quantize, quantize, quantize_with_bound, select_bound, TensorQuantizer,
};
pub use state::AqtState;
pub use tensor::{PackedQuantizedTensor, QuantizedTensor};
