//! Little-endian f32 codec for content and intent embeddings
//!
//! Single vectors are stored headerless (dimension comes from configuration).
//! Vector sets carry an 8-byte header: `count: u32`, `dim: u32`, followed by
//! `count * dim` floats in row-major order.

use thiserror::Error;

const F32_LEN: usize = std::mem::size_of::<f32>();

/// Size of the multi-vector header in bytes
pub const HEADER_LEN: usize = 8;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("Byte length {0} is not a multiple of 4")]
    MisalignedLength(usize),

    #[error("Vector set header truncated: {0} bytes")]
    TruncatedHeader(usize),

    #[error("Vector set body has {actual} bytes, header declares {expected}")]
    BodyLengthMismatch { expected: usize, actual: usize },

    #[error("Ragged vector set: expected dimension {expected}, got {actual}")]
    RaggedDimensions { expected: usize, actual: usize },

    #[error("Vector set too large to encode: {0}")]
    TooLarge(String),
}

/// Encode one vector as raw little-endian f32s
pub fn encode_one(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * F32_LEN);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a headerless vector
pub fn decode_one(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % F32_LEN != 0 {
        return Err(CodecError::MisalignedLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(F32_LEN)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode a set of equal-dimension vectors with a `(count, dim)` header
pub fn encode_many(vectors: &[Vec<f32>]) -> Result<Vec<u8>, CodecError> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);

    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(CodecError::RaggedDimensions {
            expected: dim,
            actual: bad.len(),
        });
    }

    let count = u32::try_from(vectors.len())
        .map_err(|_| CodecError::TooLarge(format!("{} vectors", vectors.len())))?;
    let dim_u32 =
        u32::try_from(dim).map_err(|_| CodecError::TooLarge(format!("dimension {}", dim)))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * dim * F32_LEN);
    bytes.extend_from_slice(&count.to_le_bytes());
    bytes.extend_from_slice(&dim_u32.to_le_bytes());
    for vector in vectors {
        bytes.extend_from_slice(&encode_one(vector));
    }

    Ok(bytes)
}

/// Decode a vector set; an empty byte slice is an empty set
pub fn decode_many(bytes: &[u8]) -> Result<Vec<Vec<f32>>, CodecError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TruncatedHeader(bytes.len()));
    }

    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let dim = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let body = &bytes[HEADER_LEN..];

    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(F32_LEN))
        .ok_or_else(|| CodecError::TooLarge(format!("{} x {}", count, dim)))?;
    if body.len() != expected {
        return Err(CodecError::BodyLengthMismatch {
            expected,
            actual: body.len(),
        });
    }

    if dim == 0 {
        return Ok(vec![Vec::new(); count]);
    }

    body.chunks_exact(dim * F32_LEN).map(decode_one).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_single_is_headerless() {
        let bytes = encode_one(&[1.0, -2.5, 0.25]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_one(&bytes).unwrap(), vec![1.0, -2.5, 0.25]);
    }

    #[test]
    fn test_many_header_layout() {
        let vectors = vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]];
        let bytes = encode_many(&vectors).unwrap();

        assert_eq!(bytes.len(), 8 + 4 * 3 * 2);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(decode_many(&bytes).unwrap(), vectors);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(decode_many(&[]).unwrap().is_empty());

        let bytes = encode_many(&[]).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(decode_many(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(decode_one(&[0, 0, 0]), Err(CodecError::MisalignedLength(3)));
        assert_eq!(decode_many(&[1, 0, 0]), Err(CodecError::TruncatedHeader(3)));

        let mut bytes = encode_many(&[vec![1.0, 2.0]]).unwrap();
        bytes.pop();
        assert!(matches!(
            decode_many(&bytes),
            Err(CodecError::BodyLengthMismatch { .. })
        ));

        let ragged = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            encode_many(&ragged),
            Err(CodecError::RaggedDimensions { .. })
        ));
    }

    #[quickcheck]
    fn prop_single_size_and_round_trip(v: Vec<f32>) -> bool {
        let v: Vec<f32> = v.into_iter().filter(|x| x.is_finite()).collect();
        let bytes = encode_one(&v);
        bytes.len() == 4 * v.len() && decode_one(&bytes).unwrap() == v
    }

    #[quickcheck]
    fn prop_many_size_and_round_trip(count: u8, dim: u8, seed: f32) -> bool {
        let (count, dim) = (count as usize % 16, dim as usize % 16);
        let seed = if seed.is_finite() { seed } else { 0.5 };
        let vectors: Vec<Vec<f32>> = (0..count)
            .map(|i| (0..dim).map(|j| seed * (i * dim + j) as f32).collect())
            .collect();

        let bytes = encode_many(&vectors).unwrap();
        bytes.len() == HEADER_LEN + 4 * count * dim && decode_many(&bytes).unwrap() == vectors
    }
}
