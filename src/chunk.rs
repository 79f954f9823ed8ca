//! Block/chunk constants and the checksum + compression codec.
//!
//! Checksums are SHA-256
//! (`sha2`), encoded as standard or URL-safe base64 (`base64`) depending on
//! the call site; object-store payloads are zstd-compressed (`zstd`) at a
//! fixed level chosen for throughput over ratio, as befits a high-throughput
//! transfer tool.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::ChunkError;

/// Fixed block size in bytes: 512 KiB.
pub const CHUNK_SIZE: usize = 524_288;

/// zstd compression level used for all object-store payloads.
pub const ZSTD_LEVEL: i32 = 1;

/// The checksum of an all-zero `CHUNK_SIZE`-byte chunk. The sole elision key
/// for sparse-block detection.
pub const SPARSE_CHECKSUM: &str = "B4VNL+8pega6gWheZgwzLeNtXRjVRpJ9MNqtbX/aFUE=";

/// Standard base64 SHA-256 over `data`. Infallible.
pub fn hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    STANDARD.encode(digest)
}

/// URL-safe, unpadded base64 SHA-256 over `data`. Used for segment keys,
/// which must be safe to embed directly in an object-store key without
/// further escaping.
pub fn urlsafe_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    URL_SAFE_NO_PAD.encode(digest)
}

/// `true` when `checksum` is the constant sparse sentinel.
///
/// The comparison is a plain string equality: the checksum itself, not the
/// byte contents, is the sparse/non-sparse decision.
pub fn is_sparse(checksum: &str) -> bool {
    checksum == SPARSE_CHECKSUM
}

/// Compresses `data` with zstd at [`ZSTD_LEVEL`].
pub fn compress(data: &[u8]) -> Vec<u8> {
    zstd::encode_all(data, ZSTD_LEVEL).expect("in-memory zstd encode cannot fail")
}

/// Decompresses a zstd frame produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ChunkError> {
    zstd::decode_all(data).map_err(|e| ChunkError::CorruptSegment { detail: e.to_string() })
}

/// Right-pads `data` with zero bytes to exactly `CHUNK_SIZE`, as required
/// for a short trailing read from a local upload source.
///
/// Panics if `data.len() > CHUNK_SIZE` — callers must never read more than
/// one chunk's worth of bytes at a time.
pub fn pad_to_chunk_size(mut data: Vec<u8>) -> Vec<u8> {
    assert!(data.len() <= CHUNK_SIZE, "short read exceeded CHUNK_SIZE");
    data.resize(CHUNK_SIZE, 0);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_checksum_matches_all_zero_chunk() {
        let zero_chunk = vec![0u8; CHUNK_SIZE];
        assert_eq!(hash(&zero_chunk), SPARSE_CHECKSUM);
        assert!(is_sparse(&hash(&zero_chunk)));
    }

    #[test]
    fn non_sparse_checksum_is_not_flagged_sparse() {
        let chunk = vec![1u8; CHUNK_SIZE];
        assert!(!is_sparse(&hash(&chunk)));
    }

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(hash(data), hash(data));
        assert_eq!(urlsafe_hash(data), urlsafe_hash(data));
    }

    #[test]
    fn urlsafe_hash_has_no_padding_or_slashes() {
        let h = urlsafe_hash(b"some segment payload");
        assert!(!h.contains('='));
        assert!(!h.contains('/'));
        assert!(!h.contains('+'));
    }

    #[test]
    fn compress_decompress_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = compress(&data);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn decompress_rejects_garbage() {
        let garbage = vec![0xFFu8; 16];
        assert!(decompress(&garbage).is_err());
    }

    #[test]
    fn pad_to_chunk_size_zero_fills_short_reads() {
        let short = vec![7u8; 10];
        let padded = pad_to_chunk_size(short);
        assert_eq!(padded.len(), CHUNK_SIZE);
        assert_eq!(&padded[..10], &[7u8; 10]);
        assert!(padded[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn pad_to_chunk_size_is_noop_for_full_chunk() {
        let full = vec![9u8; CHUNK_SIZE];
        let padded = pad_to_chunk_size(full.clone());
        assert_eq!(padded, full);
    }
}
