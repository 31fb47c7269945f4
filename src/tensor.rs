//! Tensor codec: the binary payload contract for data messages.
//!
//! A tensor travels as one bincode-serialized record holding a dtype tag, a
//! shape vector, and the row-major little-endian element buffer. Inputs are
//! `F32` images; replies are `U32` label maps.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::TensorError;

/// Element type of an encoded tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    U32,
}

impl Dtype {
    /// Element size in bytes.
    pub fn size(self) -> usize {
        match self {
            Dtype::F32 | Dtype::U32 => 4,
        }
    }
}

/// Wire record for one tensor payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMessage {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl TensorMessage {
    /// Decode a wire buffer, validating the buffer length against the shape.
    ///
    /// The shape header comes off the wire, so the byte length it implies is
    /// computed with checked arithmetic; an overflowing shape is rejected
    /// like any other malformed message.
    pub fn decode(raw: &[u8]) -> Result<Self, TensorError> {
        let msg: TensorMessage = bincode::deserialize(raw).map_err(TensorError::Decode)?;
        let want = byte_len(&msg.shape, msg.dtype).ok_or_else(|| TensorError::ShapeOverflow {
            shape: msg.shape.clone(),
        })?;
        if want != msg.data.len() {
            return Err(TensorError::LengthMismatch {
                shape: msg.shape,
                want,
                got: msg.data.len(),
            });
        }
        Ok(msg)
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, TensorError> {
        bincode::serialize(self).map_err(TensorError::Encode)
    }

    pub fn from_f32(array: &ArrayD<f32>) -> Self {
        let mut data = Vec::with_capacity(array.len() * 4);
        for &v in array.iter() {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            dtype: Dtype::F32,
            shape: array.shape().to_vec(),
            data,
        }
    }

    pub fn from_u32(array: &ArrayD<u32>) -> Self {
        let mut data = Vec::with_capacity(array.len() * 4);
        for &v in array.iter() {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            dtype: Dtype::U32,
            shape: array.shape().to_vec(),
            data,
        }
    }

    pub fn to_f32(&self) -> Result<ArrayD<f32>, TensorError> {
        if self.dtype != Dtype::F32 {
            return Err(TensorError::DtypeMismatch("expected F32"));
        }
        let elems = self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.to_array(elems)
    }

    pub fn to_u32(&self) -> Result<ArrayD<u32>, TensorError> {
        if self.dtype != Dtype::U32 {
            return Err(TensorError::DtypeMismatch("expected U32"));
        }
        let elems = self
            .data
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.to_array(elems)
    }

    fn to_array<T>(&self, elems: Vec<T>) -> Result<ArrayD<T>, TensorError> {
        let want = byte_len(&self.shape, self.dtype).ok_or_else(|| TensorError::ShapeOverflow {
            shape: self.shape.clone(),
        })?;
        let got = elems.len() * self.dtype.size();
        ArrayD::from_shape_vec(IxDyn(&self.shape), elems).map_err(|_| {
            TensorError::LengthMismatch {
                shape: self.shape.clone(),
                want,
                got,
            }
        })
    }
}

/// Byte length a shape implies, or `None` when the product overflows.
fn byte_len(shape: &[usize], dtype: Dtype) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .and_then(|elems| elems.checked_mul(dtype.size()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn f32_round_trip_preserves_shape_and_values() {
        let input = array![[0.5f32, 1.0, -2.25], [3.5, 0.0, 9.75]].into_dyn();
        let wire = TensorMessage::from_f32(&input).encode().unwrap();
        let back = TensorMessage::decode(&wire).unwrap().to_f32().unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn u32_round_trip_preserves_shape_and_values() {
        let input = array![[1u32, 0, 2], [2, 3, 0]].into_dyn();
        let wire = TensorMessage::from_u32(&input).encode().unwrap();
        let back = TensorMessage::decode(&wire).unwrap().to_u32().unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn dtype_mismatch_is_rejected() {
        let msg = TensorMessage::from_f32(&array![[1.0f32]].into_dyn());
        assert!(matches!(msg.to_u32(), Err(TensorError::DtypeMismatch(_))));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut msg = TensorMessage::from_f32(&array![[1.0f32, 2.0]].into_dyn());
        msg.data.truncate(5);
        let wire = msg.encode().unwrap();
        assert!(matches!(
            TensorMessage::decode(&wire),
            Err(TensorError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn oversized_shape_header_is_rejected() {
        let msg = TensorMessage {
            dtype: Dtype::F32,
            shape: vec![usize::MAX / 2, 3],
            data: vec![0; 4],
        };
        let wire = msg.encode().unwrap();
        assert!(matches!(
            TensorMessage::decode(&wire),
            Err(TensorError::ShapeOverflow { .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_decode() {
        assert!(matches!(
            TensorMessage::decode(&[0xde, 0xad, 0xbe, 0xef]),
            Err(TensorError::Decode(_) | TensorError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn buffer_is_row_major_little_endian() {
        let msg = TensorMessage::from_u32(&array![[1u32, 2], [3, 4]].into_dyn());
        assert_eq!(msg.shape, vec![2, 2]);
        assert_eq!(
            msg.data,
            vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]
        );
    }
}
