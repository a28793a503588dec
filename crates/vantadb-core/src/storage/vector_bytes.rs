//! Little-endian byte conversion for vector data.
//!
//! All on-disk vector bytes are little-endian f32, independent of host
//! endianness.

/// Converts a vector to little-endian bytes.
pub(crate) fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Converts little-endian bytes back to a vector of `dimension` values.
///
/// # Panics
///
/// Panics if `bytes` is shorter than `dimension * 4`. Callers bound-check
/// against the mapped region first.
pub(crate) fn bytes_to_vector(bytes: &[u8], dimension: usize) -> Vec<f32> {
    bytes[..dimension * 4]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let vector = vec![1.5f32, -2.25, 0.0, f32::MIN_POSITIVE];
        let bytes = vector_to_bytes(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_vector(&bytes, 4), vector);
    }
}
