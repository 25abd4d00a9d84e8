//! Quantized arithmetic kernels
//!
//! Einsum-style contractions over quantized operands:
//! - **quantized**: integer accumulation in `i64`, one rescale afterwards
//! - **fakequant**: float contraction of quantize-dequantized operands
//! - **dispatch**: the single call a layer makes, choosing between them
//!
//! All kernels share the [`EinsumPlan`] parser and executor.

mod dispatch;
mod einsum;
mod fakequant;
mod quantized;


pub use dispatch::{layer_einsum, quantize_tensor};
pub use einsum::{einsum, EinsumPlan, Operand};
pub use fakequant::fakequant_einsum;
pub use quantized::{check_accumulator, mixed_einsum, quantized_einsum, quantized_matmul};
