//! Integer ranges and affine quantization parameters
//!
//! Symmetric quantization uses the narrow signed range `[-max_int, max_int]`
//! so that zero is exact and the grid is mirror-symmetric. Asymmetric
//! quantization uses the full signed range `[-2^(b-1), 2^(b-1) - 1]` with an
//! integer zero point.

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};

/// Widest integer range `bitwidth_to_range` accepts
pub const MAX_RANGE_BITS: u8 = 32;

/// Smallest clipping bound; all-zero inputs fall back to it
pub const MIN_BOUND: f32 = 1e-8;

/// Quantization mode: symmetric or asymmetric
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantMode {
    /// Symmetric: zero-point = 0, range = [-bound, bound]
    #[default]
    Symmetric,
    /// Asymmetric: zero-point != 0, range = [min, max]
    Asymmetric,
}

/// Inclusive integer range representable at a bit width
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRange {
    pub min_int: i64,
    pub max_int: i64,
}

impl IntRange {
    /// Number of representable integer levels
    pub fn levels(&self) -> u64 {
        (self.max_int - self.min_int) as u64 + 1
    }

    /// Largest magnitude any value in the range can have
    pub fn max_abs(&self) -> i64 {
        self.min_int.abs().max(self.max_int.abs())
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min_int && value <= self.max_int
    }
}

/// Integer range for a bit width
///
/// Signed: `[-2^(bits-1), 2^(bits-1) - 1]`. Unsigned: `[0, 2^bits - 1]`.
pub fn bitwidth_to_range(bits: u8, signed: bool) -> Result<IntRange> {
    if bits == 0 || bits > MAX_RANGE_BITS {
        return Err(QuantError::InvalidConfig(format!(
            "unsupported bit width {bits} (must be 1..={MAX_RANGE_BITS})"
        )));
    }

    let range = if signed {
        IntRange {
            min_int: -(1i64 << (bits - 1)),
            max_int: (1i64 << (bits - 1)) - 1,
        }
    } else {
        IntRange {
            min_int: 0,
            max_int: (1i64 << bits) - 1,
        }
    };
    Ok(range)
}

/// Narrow signed range `[-(2^(bits-1) - 1), 2^(bits-1) - 1]` used by symmetric mode
pub fn symmetric_range(bits: u8) -> Result<IntRange> {
    let full = bitwidth_to_range(bits, true)?;
    if full.max_int == 0 {
        return Err(QuantError::InvalidConfig(format!(
            "symmetric quantization needs at least 2 bits, got {bits}"
        )));
    }
    Ok(IntRange {
        min_int: -full.max_int,
        max_int: full.max_int,
    })
}

/// Round half to even, then clip into `[min_int, max_int]`
///
/// The range must fit the `i32` storage type; the 32-bit unsigned range
/// from `bitwidth_to_range(32, false)` does not and is rejected.
pub fn round_and_clip(
    x: ArrayViewD<'_, f32>,
    min_int: i64,
    max_int: i64,
) -> Result<ArrayD<i32>> {
    if min_int > max_int || min_int < i32::MIN as i64 || max_int > i32::MAX as i64 {
        return Err(QuantError::InvalidConfig(format!(
            "integer range [{min_int}, {max_int}] does not fit in i32"
        )));
    }
    let lo = min_int as f64;
    let hi = max_int as f64;
    Ok(x.mapv(|v| round_clip_value(v, lo, hi)))
}

#[inline]
fn round_clip_value(v: f32, lo: f64, hi: f64) -> i32 {
    // f64 keeps 32-bit range endpoints exact; NaN saturates to 0 on the cast
    (v.round_ties_even() as f64).clamp(lo, hi) as i32
}

/// Scale and zero point for one channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    /// Real value of one integer step, always > 0
    pub scale: f32,
    /// Integer that represents real 0.0 (0 for symmetric)
    pub zero_point: i32,
    /// Integer range values are clipped into
    pub range: IntRange,
}

impl AffineParams {
    /// Derive parameters from a clipping range `[min, max]`
    ///
    /// Symmetric mode uses `max(|min|, |max|)` as the bound. Asymmetric mode
    /// widens the range to contain 0 so the zero point is an exact integer.
    pub fn from_bound(min: f32, max: f32, bits: u8, mode: QuantMode) -> Result<Self> {
        match mode {
            QuantMode::Symmetric => {
                let range = symmetric_range(bits)?;
                let bound = min.abs().max(max.abs()).max(MIN_BOUND);
                Ok(Self {
                    scale: bound / range.max_int as f32,
                    zero_point: 0,
                    range,
                })
            }
            QuantMode::Asymmetric => {
                let range = bitwidth_to_range(bits, true)?;
                let lo = min.min(0.0);
                let hi = max.max(0.0);
                let span = (hi - lo).max(MIN_BOUND);
                let scale = span / (range.max_int - range.min_int) as f32;
                let zero_point = (range.min_int as f64 - (lo / scale).round_ties_even() as f64)
                    .clamp(range.min_int as f64, range.max_int as f64)
                    as i32;
                Ok(Self {
                    scale,
                    zero_point,
                    range,
                })
            }
        }
    }

    /// Quantize one value onto the integer grid
    #[inline]
    pub fn quantize(&self, x: f32) -> i32 {
        let q = (x / self.scale).round_ties_even() as f64 + self.zero_point as f64;
        q.clamp(self.range.min_int as f64, self.range.max_int as f64) as i32
    }

    /// Map an integer back to its real value
    #[inline]
    pub fn dequantize(&self, q: i32) -> f32 {
        (q as i64 - self.zero_point as i64) as f32 * self.scale
    }

    /// Quantize then dequantize
    #[inline]
    pub fn fake_quantize(&self, x: f32) -> f32 {
        self.dequantize(self.quantize(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, IxDyn};
    use proptest::prelude::*;

    #[test]
    fn test_bitwidth_to_range_signed() {
        assert_eq!(
            bitwidth_to_range(8, true).unwrap(),
            IntRange {
                min_int: -128,
                max_int: 127
            }
        );
        assert_eq!(
            bitwidth_to_range(4, true).unwrap(),
            IntRange {
                min_int: -8,
                max_int: 7
            }
        );
        assert_eq!(bitwidth_to_range(32, true).unwrap().min_int, i32::MIN as i64);
    }

    #[test]
    fn test_bitwidth_to_range_unsigned() {
        let range = bitwidth_to_range(8, false).unwrap();
        assert_eq!(range.min_int, 0);
        assert_eq!(range.max_int, 255);
        assert_eq!(range.levels(), 256);
    }

    #[test]
    fn test_bitwidth_to_range_rejects_out_of_range() {
        assert!(matches!(
            bitwidth_to_range(0, true),
            Err(QuantError::InvalidConfig(_))
        ));
        assert!(matches!(
            bitwidth_to_range(33, false),
            Err(QuantError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_symmetric_range_is_narrow() {
        let range = symmetric_range(8).unwrap();
        assert_eq!(range.min_int, -127);
        assert_eq!(range.max_int, 127);
        assert!(symmetric_range(1).is_err());
    }

    #[test]
    fn test_round_and_clip_ties_to_even() {
        let x = arr1(&[0.5f32, 1.5, 2.5, -0.5, -1.5, 200.0, -200.0]).into_dyn();
        let q = round_and_clip(x.view(), -127, 127).unwrap();
        assert_eq!(q.as_slice().unwrap(), &[0, 2, 2, 0, -2, 127, -127]);
    }

    #[test]
    fn test_round_and_clip_preserves_shape() {
        let x = ArrayD::from_elem(IxDyn(&[2, 3, 4]), 1.2f32);
        let q = round_and_clip(x.view(), -8, 7).unwrap();
        assert_eq!(q.shape(), &[2, 3, 4]);
        assert!(q.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_round_and_clip_rejects_ranges_wider_than_i32() {
        let x = arr1(&[4.0e9f32]).into_dyn();
        let unsigned = bitwidth_to_range(32, false).unwrap();
        assert!(matches!(
            round_and_clip(x.view(), unsigned.min_int, unsigned.max_int),
            Err(QuantError::InvalidConfig(_))
        ));
        assert!(round_and_clip(x.view(), 5, 4).is_err());

        // the full signed 32-bit range is representable and saturates at its ends
        let signed = bitwidth_to_range(32, true).unwrap();
        let q = round_and_clip(x.view(), signed.min_int, signed.max_int).unwrap();
        assert_eq!(q.as_slice().unwrap(), &[i32::MAX]);

        let unsigned_31 = bitwidth_to_range(31, false).unwrap();
        let x = arr1(&[1.0e9f32]).into_dyn();
        let q = round_and_clip(x.view(), unsigned_31.min_int, unsigned_31.max_int).unwrap();
        assert_eq!(q.as_slice().unwrap(), &[1_000_000_000]);
    }

    #[test]
    fn test_affine_symmetric() {
        let params = AffineParams::from_bound(-3.0, 3.0, 8, QuantMode::Symmetric).unwrap();
        assert_eq!(params.zero_point, 0);
        assert_abs_diff_eq!(params.scale, 3.0 / 127.0, epsilon = 1e-9);
        assert_eq!(params.quantize(3.0), 127);
        assert_eq!(params.quantize(-3.0), -127);
        assert_eq!(params.quantize(0.0), 0);
        assert_eq!(params.quantize(100.0), 127);
    }

    #[test]
    fn test_affine_asymmetric_positive_range() {
        let params = AffineParams::from_bound(0.0, 4.0, 8, QuantMode::Asymmetric).unwrap();
        assert_eq!(params.zero_point, -128);
        assert_eq!(params.quantize(0.0), -128);
        assert_eq!(params.quantize(4.0), 127);
        assert_abs_diff_eq!(params.fake_quantize(2.0), 2.0, epsilon = params.scale);
    }

    #[test]
    fn test_affine_all_zero_scale_positive() {
        for mode in [QuantMode::Symmetric, QuantMode::Asymmetric] {
            let params = AffineParams::from_bound(0.0, 0.0, 8, mode).unwrap();
            assert!(params.scale > 0.0);
            assert_eq!(params.fake_quantize(0.0), 0.0);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_fake_quantize_error_within_half_step(
            lo in -50.0f32..0.0,
            hi in 0.0f32..50.0,
            t in 0.0f32..1.0,
            bits in 2u8..12,
            asymmetric in any::<bool>(),
        ) {
            let mode = if asymmetric { QuantMode::Asymmetric } else { QuantMode::Symmetric };
            let params = AffineParams::from_bound(lo, hi, bits, mode).unwrap();
            let x = lo + t * (hi - lo);
            let err = (params.fake_quantize(x) - x).abs();
            prop_assert!(err <= params.scale * 0.5 + 1e-4, "err {} scale {}", err, params.scale);
        }

        #[test]
        fn prop_quantized_values_stay_in_range(
            x in -1e6f32..1e6,
            bits in 2u8..16,
            asymmetric in any::<bool>(),
        ) {
            let mode = if asymmetric { QuantMode::Asymmetric } else { QuantMode::Symmetric };
            let params = AffineParams::from_bound(-1.0, 2.0, bits, mode).unwrap();
            prop_assert!(params.range.contains(params.quantize(x) as i64));
        }
    }
}
