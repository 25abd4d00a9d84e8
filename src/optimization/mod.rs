//! Clipping-bound optimization
//!
//! Picks the clipping range that minimizes the reconstruction error between
//! a float tensor and its quantize-dequantize image:
//! - **metric**: the error objectives (MSE, MAE, max-abs)
//! - **search**: deterministic grid + golden-section search, per tensor or
//!   independently per channel

mod bound;
mod metric;
mod search;

#[cfg(test)]
mod tests;

pub use bound::{observed_bound, ClippingBound};
pub use metric::{quantization_error, ErrorMetric};
pub use search::{search_bound, search_channel, ChannelSearch};
