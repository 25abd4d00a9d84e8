//! Bit-exact int4 packing
//!
//! Eight signed 4-bit values are packed into one `i32` word along a chosen
//! axis. Element `j` of a group occupies bits `4j..4j+4` (two's complement
//! nibble), so the first element lands in the least significant nibble.

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use super::layout::check_axis;
use crate::error::{QuantError, Result};

/// Number of int4 values stored per packed word
pub const INT4_PER_WORD: usize = 8;

fn move_axis_last(ndim: usize, axis: usize) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..ndim).filter(|&d| d != axis).collect();
    order.push(axis);
    let mut inverse = vec![0; ndim];
    for (i, &d) in order.iter().enumerate() {
        inverse[d] = i;
    }
    (order, inverse)
}

fn restore_axis(data: Vec<i32>, moved_shape: Vec<usize>, inverse: &[usize]) -> Result<ArrayD<i32>> {
    let moved = ArrayD::from_shape_vec(IxDyn(&moved_shape), data)
        .map_err(|e| QuantError::ShapeError(e.to_string()))?;
    Ok(moved
        .permuted_axes(IxDyn(inverse))
        .as_standard_layout()
        .into_owned())
}

/// Pack int4 values along `axis`, shrinking it by a factor of 8
pub fn pack_int4(values: ArrayViewD<'_, i32>, axis: usize) -> Result<ArrayD<i32>> {
    let ndim = values.ndim();
    check_axis(axis, ndim)?;
    let len = values.shape()[axis];
    if len % INT4_PER_WORD != 0 {
        return Err(QuantError::ShapeError(format!(
            "int4 packing needs axis {axis} length divisible by {INT4_PER_WORD}, got {len}"
        )));
    }
    if let Some(bad) = values.iter().find(|&&v| !(-8..=7).contains(&v)) {
        return Err(QuantError::InvalidConfig(format!(
            "value {bad} does not fit in 4 bits"
        )));
    }

    let (order, inverse) = move_axis_last(ndim, axis);
    let moved = values.permuted_axes(IxDyn(&order));
    let mut moved_shape = moved.shape().to_vec();
    let flat: Vec<i32> = moved.iter().copied().collect();

    let packed: Vec<i32> = flat
        .chunks_exact(INT4_PER_WORD)
        .map(|group| {
            group.iter().enumerate().fold(0u32, |word, (j, &v)| {
                word | (((v as u32) & 0x0F) << (4 * j))
            }) as i32
        })
        .collect();

    if let Some(last) = moved_shape.last_mut() {
        *last /= INT4_PER_WORD;
    }
    restore_axis(packed, moved_shape, &inverse)
}

/// Inverse of [`pack_int4`]: expand `axis` by a factor of 8
pub fn unpack_int4(packed: ArrayViewD<'_, i32>, axis: usize) -> Result<ArrayD<i32>> {
    let ndim = packed.ndim();
    check_axis(axis, ndim)?;

    let (order, inverse) = move_axis_last(ndim, axis);
    let moved = packed.permuted_axes(IxDyn(&order));
    let mut moved_shape = moved.shape().to_vec();

    let unpacked: Vec<i32> = moved
        .iter()
        .flat_map(|&word| {
            // shift the nibble to the top, then sign-extend back down
            (0..INT4_PER_WORD).map(move |j| word.wrapping_shl(28 - 4 * j as u32) >> 28)
        })
        .collect();

    if let Some(last) = moved_shape.last_mut() {
        *last *= INT4_PER_WORD;
    }
    restore_axis(unpacked, moved_shape, &inverse)
}
