//! Quantized tensor representation

use ndarray::{ArrayD, Zip};
use serde::Serialize;

use crate::error::{QuantError, Result};
use crate::utils::{
    bitwidth_to_range, pack_int4, symmetric_range, unpack_int4, IntRange, QuantMode,
    MAX_RANGE_BITS,
};

/// Integer tensor with its scale and optional zero point
///
/// `scale` (and `zero_point`) have the same rank as `values` and size 1 on
/// every axis except the channel axis, so they broadcast against `values`.
/// The real value of element `v` is `(v - zero_point) * scale`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuantizedTensor {
    values: ArrayD<i32>,
    scale: ArrayD<f32>,
    zero_point: Option<ArrayD<i32>>,
    bits: u8,
    mode: QuantMode,
}

/// Integer range of a bit width and mode
pub(crate) fn mode_range(bits: u8, mode: QuantMode) -> Result<IntRange> {
    match mode {
        QuantMode::Symmetric => symmetric_range(bits),
        QuantMode::Asymmetric => bitwidth_to_range(bits, true),
    }
}

fn check_broadcast(param: &[usize], values: &[usize]) -> Result<()> {
    let fits = param.len() == values.len()
        && param.iter().zip(values).all(|(&p, &v)| p == 1 || p == v);
    if fits {
        Ok(())
    } else {
        Err(QuantError::ShapeMismatch {
            expected: values.to_vec(),
            got: param.to_vec(),
        })
    }
}

impl QuantizedTensor {
    /// Assemble a quantized tensor, validating every invariant
    ///
    /// Fails with `ShapeMismatch` if the scale or zero point does not
    /// broadcast against `values`, and with `InvalidConfig` if a scale is not
    /// strictly positive, the zero point presence does not match the mode,
    /// or a value lies outside the integer range of `bits`.
    pub fn new(
        values: ArrayD<i32>,
        scale: ArrayD<f32>,
        zero_point: Option<ArrayD<i32>>,
        bits: u8,
        mode: QuantMode,
    ) -> Result<Self> {
        if bits > MAX_RANGE_BITS {
            return Err(QuantError::InvalidConfig(format!(
                "unsupported bit width {bits}"
            )));
        }
        let range = mode_range(bits, mode)?;

        check_broadcast(scale.shape(), values.shape())?;
        if scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(QuantError::InvalidConfig(
                "scales must be finite and strictly positive".into(),
            ));
        }

        match (&zero_point, mode) {
            (Some(zp), QuantMode::Asymmetric) => {
                if zp.shape() != scale.shape() {
                    return Err(QuantError::ShapeMismatch {
                        expected: scale.shape().to_vec(),
                        got: zp.shape().to_vec(),
                    });
                }
                if let Some(&z) = zp.iter().find(|&&z| !range.contains(z as i64)) {
                    return Err(QuantError::InvalidConfig(format!(
                        "zero point {z} outside [{}, {}]",
                        range.min_int, range.max_int
                    )));
                }
            }
            (None, QuantMode::Symmetric) => {}
            (Some(_), QuantMode::Symmetric) => {
                return Err(QuantError::InvalidConfig(
                    "symmetric tensors carry no zero point".into(),
                ))
            }
            (None, QuantMode::Asymmetric) => {
                return Err(QuantError::InvalidConfig(
                    "asymmetric tensors need a zero point".into(),
                ))
            }
        }

        if let Some(&v) = values.iter().find(|&&v| !range.contains(v as i64)) {
            return Err(QuantError::InvalidConfig(format!(
                "value {v} outside the {bits}-bit range [{}, {}]",
                range.min_int, range.max_int
            )));
        }

        Ok(Self {
            values,
            scale,
            zero_point,
            bits,
            mode,
        })
    }

    pub fn values(&self) -> &ArrayD<i32> {
        &self.values
    }

    pub fn scale(&self) -> &ArrayD<f32> {
        &self.scale
    }

    pub fn zero_point(&self) -> Option<&ArrayD<i32>> {
        self.zero_point.as_ref()
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn mode(&self) -> QuantMode {
        self.mode
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    /// `values - zero_point`, widened to `i64`
    pub fn centered(&self) -> ArrayD<i64> {
        match &self.zero_point {
            Some(zp) => Zip::from(&self.values)
                .and_broadcast(zp)
                .map_collect(|&v, &z| v as i64 - z as i64),
            None => self.values.mapv(i64::from),
        }
    }

    /// Largest `|values - zero_point|`; 0 for an empty tensor
    pub fn max_abs_centered(&self) -> i64 {
        self.centered().iter().fold(0, |m, v| m.max(v.abs()))
    }

    /// Reconstruct the float tensor: `(values - zero_point) * scale`
    pub fn dequantize(&self) -> ArrayD<f32> {
        match &self.zero_point {
            Some(zp) => Zip::from(&self.values)
                .and_broadcast(zp)
                .and_broadcast(&self.scale)
                .map_collect(|&v, &z, &s| (v as i64 - z as i64) as f32 * s),
            None => Zip::from(&self.values)
                .and_broadcast(&self.scale)
                .map_collect(|&v, &s| v as f32 * s),
        }
    }

    /// Storage footprint at the nominal bit width, plus 4 bytes per parameter
    pub fn memory_bytes(&self) -> usize {
        let value_bytes = (self.values.len() * self.bits as usize).div_ceil(8);
        let zp_len = self.zero_point.as_ref().map_or(0, |zp| zp.len());
        value_bytes + (self.scale.len() + zp_len) * 4
    }

    /// Pack the values into `i32` words of eight nibbles along `axis`
    ///
    /// Only tensors of at most 4 bits can be packed.
    pub fn pack_int4(&self, axis: usize) -> Result<PackedQuantizedTensor> {
        if self.bits > 4 {
            return Err(QuantError::InvalidConfig(format!(
                "cannot pack {}-bit values into 4-bit nibbles",
                self.bits
            )));
        }
        Ok(PackedQuantizedTensor {
            packed: pack_int4(self.values.view(), axis)?,
            axis,
            scale: self.scale.clone(),
            zero_point: self.zero_point.clone(),
            bits: self.bits,
            mode: self.mode,
        })
    }
}

/// Int4 storage form of a [`QuantizedTensor`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackedQuantizedTensor {
    packed: ArrayD<i32>,
    axis: usize,
    scale: ArrayD<f32>,
    zero_point: Option<ArrayD<i32>>,
    bits: u8,
    mode: QuantMode,
}

impl PackedQuantizedTensor {
    pub fn packed(&self) -> &ArrayD<i32> {
        &self.packed
    }

    /// Axis the nibbles were packed along
    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn memory_bytes(&self) -> usize {
        let zp_len = self.zero_point.as_ref().map_or(0, |zp| zp.len());
        (self.packed.len() + self.scale.len() + zp_len) * 4
    }

    /// Restore the unpacked tensor
    pub fn unpack(&self) -> Result<QuantizedTensor> {
        let values = unpack_int4(self.packed.view(), self.axis)?;
        QuantizedTensor::new(
            values,
            self.scale.clone(),
            self.zero_point.clone(),
            self.bits,
            self.mode,
        )
    }
}
