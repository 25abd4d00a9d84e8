//! Numeric plumbing shared by every other module
//!
//! - **range**: bit width to integer range, affine scale/zero-point, rounding
//! - **layout**: granularity-aware reshapes (per-tensor vs per-channel)
//! - **packing**: bit-exact int4 packing into 32-bit words

mod layout;
mod packing;
mod range;

pub use layout::{
    channel_shape, check_axis, expand_channels, reshape_for_granularity, Granularity,
};
pub use packing::{pack_int4, unpack_int4, INT4_PER_WORD};
pub use range::{
    bitwidth_to_range, round_and_clip, symmetric_range, AffineParams, IntRange, QuantMode,
    MAX_RANGE_BITS, MIN_BOUND,
};
