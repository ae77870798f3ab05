//! Compression schemes for container copies.
//!
//! The scheme is negotiated with the source node (wire protocol lives
//! elsewhere); this module carries the scheme through the download contract
//! and decodes staged archives at import time.

use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, ReplicationResult};

/// Zstd level used when packing copies. Levels 1–22 are valid; 3 is the
/// latency/ratio sweet spot for intra-cluster links.
const ZSTD_LEVEL: i32 = 3;

/// Compression scheme applied to a container copy in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CopyCompression {
    /// No compression.
    None,
    /// LZ4 with a length prefix (low latency, ~2x ratio).
    #[default]
    Lz4,
    /// Zstd (higher ratio, more CPU).
    Zstd,
}

impl CopyCompression {
    /// Returns true if this scheme actually compresses data.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// File extension for staged archives under this scheme.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::None => "pack",
            Self::Lz4 => "pack.lz4",
            Self::Zstd => "pack.zst",
        }
    }

    /// Encodes a container payload for transit.
    pub fn compress(&self, data: &[u8]) -> ReplicationResult<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| {
                ReplicationError::Compression { msg: e.to_string() }
            }),
        }
    }

    /// Decodes a staged archive back into the container payload.
    pub fn decompress(&self, data: &[u8]) -> ReplicationResult<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| ReplicationError::Compression { msg: e.to_string() }),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| ReplicationError::Compression { msg: e.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lz4() {
        assert_eq!(CopyCompression::default(), CopyCompression::Lz4);
    }

    #[test]
    fn test_is_compressed() {
        assert!(!CopyCompression::None.is_compressed());
        assert!(CopyCompression::Lz4.is_compressed());
        assert!(CopyCompression::Zstd.is_compressed());
    }

    #[test]
    fn test_file_extensions() {
        assert_eq!(CopyCompression::None.file_extension(), "pack");
        assert_eq!(CopyCompression::Lz4.file_extension(), "pack.lz4");
        assert_eq!(CopyCompression::Zstd.file_extension(), "pack.zst");
    }

    #[test]
    fn test_lz4_roundtrip_restores_payload() {
        let payload = vec![7u8; 64 * 1024];
        let packed = CopyCompression::Lz4.compress(&payload).unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(CopyCompression::Lz4.decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn test_garbage_input_is_a_compression_error() {
        // Valid 8-byte size prefix, invalid compressed body.
        let garbage = [8u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = CopyCompression::Lz4.decompress(&garbage).unwrap_err();
        assert!(matches!(err, ReplicationError::Compression { .. }));

        let err = CopyCompression::Zstd.decompress(&[0xFFu8; 16]).unwrap_err();
        assert!(matches!(err, ReplicationError::Compression { .. }));
    }

    #[test]
    fn test_none_passes_through() {
        let payload = b"container bytes".to_vec();
        assert_eq!(CopyCompression::None.compress(&payload).unwrap(), payload);
        assert_eq!(CopyCompression::None.decompress(&payload).unwrap(), payload);
    }

    #[test]
    fn test_scheme_serde_names() {
        assert_eq!(
            serde_json::to_string(&CopyCompression::Zstd).unwrap(),
            "\"Zstd\""
        );
    }
}
