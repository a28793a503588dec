//! Snapshot persistence.
//!
//! A snapshot is a self-describing binary file: a versioned header, a
//! section directory with per-section CRC32 checksums, then the sections
//! (storage records, the database manifest, quantizer state, and the
//! serialized HNSW graph when the index is HNSW). Reading the header is
//! sufficient to validate compatibility.
//!
//! Restore always targets a freshly constructed coordinator; a snapshot is
//! never applied to an in-flight database.

mod snapshot;

#[cfg(test)]
mod tests;

pub use snapshot::{SnapshotReader, SnapshotWriter};

/// CRC32 in the reflected IEEE 802.3 form, used for section integrity.
///
/// Snapshot sections are written and read once, so the plain bitwise form
/// is used instead of a lookup table; the inner step is branchless (the
/// mask is all-ones exactly when the low bit is set).
#[inline]
pub(crate) fn crc32_hash(data: &[u8]) -> u32 {
    const REFLECTED_POLY: u32 = 0xEDB8_8320;

    let crc = data.iter().fold(u32::MAX, |crc, &byte| {
        (0..8).fold(crc ^ u32::from(byte), |crc, _| {
            let mask = (crc & 1).wrapping_neg();
            (crc >> 1) ^ (REFLECTED_POLY & mask)
        })
    });
    !crc
}

#[cfg(test)]
mod crc_tests {
    use super::crc32_hash;

    #[test]
    fn test_known_crc32_vector() {
        // IEEE CRC32 of "123456789".
        assert_eq!(crc32_hash(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc_detects_corruption() {
        let a = crc32_hash(b"hello world");
        let b = crc32_hash(b"hello worle");
        assert_ne!(a, b);
    }
}
