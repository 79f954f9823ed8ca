//! `SegmentCodec` — the object-store path.
//!
//! Packs a run of up to 64 contiguous blocks into one compressed object;
//! unpacks it back into individual `put_block` calls on read. One logical
//! unit becomes one compressed blob with a self-describing key, since the
//! object store is the only index here.

use std::sync::Arc;

use crate::chunk;
use crate::client::{Block, ObjectStoreClient};
use crate::error::{ChunkError, RpcError};

/// Maximum blocks per segment; boundary whenever `index % SEGMENT_BLOCKS == 0`.
pub const SEGMENT_BLOCKS: u32 = 64;

/// Concurrency degree for segment uploads.
pub const SEGMENT_UPLOAD_DEGREE: usize = 128;

/// One packed run of contiguous blocks, ready to concatenate and upload.
#[derive(Debug, Clone)]
pub struct Segment {
    pub first_index: u32,
    pub blocks: Vec<Block>,
}

/// Packs an in-order block list into maximal runs per the packing rule:
/// a block extends the current segment iff it is `prev.index + 1` and its
/// index is not itself a 64-block boundary.
///
/// Packing is a pure function of the input order: re-packing the same list
/// yields identical segments.
pub fn pack(blocks: Vec<Block>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for block in blocks {
        let extends_current = segments.last().is_some_and(|seg: &Segment| {
            let prev_index = seg.blocks.last().unwrap().index;
            block.index == prev_index + 1 && block.index % SEGMENT_BLOCKS != 0
        });
        if extends_current {
            segments.last_mut().unwrap().blocks.push(block);
        } else {
            segments.push(Segment { first_index: block.index, blocks: vec![block] });
        }
    }
    segments
}

/// Builds the object-store key for a segment whose concatenated, uncompressed
/// payload is `payload`.
pub fn segment_key(snapshot_id: &str, volume_size_gib: u64, first_index: u32, payload: &[u8], block_count: usize) -> String {
    let hash = chunk::urlsafe_hash(payload);
    format!("{snapshot_id}.{volume_size_gib}/{first_index}.{hash}.{block_count}.zstd")
}

/// One key's parsed components, read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub snapshot_id: String,
    pub volume_size_gib: u64,
    pub first_index: u32,
    pub hash: String,
    pub block_count: usize,
}

/// Parses a segment key back into its components. Returns `None` for any
/// key that does not match the grammar — such objects are simply not
/// segment objects and are ignored by the read path.
pub fn parse_key(key: &str) -> Option<ParsedKey> {
    let (snap_part, rest) = key.split_once('/')?;
    let (snapshot_id, vol_gib_str) = snap_part.rsplit_once('.')?;
    let volume_size_gib: u64 = vol_gib_str.parse().ok()?;

    let rest = rest.strip_suffix(".zstd")?;
    let mut parts = rest.splitn(3, '.');
    let first_index: u32 = parts.next()?.parse().ok()?;
    let hash = parts.next()?.to_owned();
    let block_count: usize = parts.next()?.parse().ok()?;

    Some(ParsedKey { snapshot_id: snapshot_id.to_owned(), volume_size_gib, first_index, hash, block_count })
}

/// Concatenates raw block payloads in index order, as required before
/// hashing/compressing a segment.
pub fn concat_payloads(payloads: &[Vec<u8>]) -> Vec<u8> {
    payloads.concat()
}

/// Encodes one segment's already-fetched payloads into the bytes to upload
/// plus the key to upload them under.
pub fn encode_segment(
    snapshot_id: &str,
    volume_size_gib: u64,
    segment: &Segment,
    payloads: &[Vec<u8>],
) -> (String, Vec<u8>) {
    let payload = concat_payloads(payloads);
    let key = segment_key(snapshot_id, volume_size_gib, segment.first_index, &payload, segment.blocks.len());
    let compressed = chunk::compress(&payload);
    (key, compressed)
}

/// Decodes one downloaded, compressed segment object, verifying its hash
/// against the key's embedded hash and slicing it back into per-block
/// chunks in index order.
///
/// Returns `Err(ChunkError::CorruptSegment)` on decompression failure or
/// hash mismatch — the caller is expected to skip the object and report
/// the affected index range rather than fail the whole operation.
pub fn decode_segment(parsed: &ParsedKey, compressed: &[u8]) -> Result<Vec<Vec<u8>>, ChunkError> {
    let payload = chunk::decompress(compressed)?;
    let actual_hash = chunk::urlsafe_hash(&payload);
    if actual_hash != parsed.hash {
        return Err(ChunkError::CorruptSegment {
            detail: format!("hash mismatch: key says {}, payload hashes to {actual_hash}", parsed.hash),
        });
    }
    if payload.len() != parsed.block_count * chunk::CHUNK_SIZE {
        return Err(ChunkError::CorruptSegment {
            detail: format!(
                "length mismatch: expected {} bytes for {} blocks, got {}",
                parsed.block_count * chunk::CHUNK_SIZE,
                parsed.block_count,
                payload.len()
            ),
        });
    }
    Ok(payload.chunks(chunk::CHUNK_SIZE).map(|c| c.to_vec()).collect())
}

/// Uploads one already-fetched segment, returning the key it was stored
/// under.
pub fn upload_segment(
    store: &Arc<dyn ObjectStoreClient>,
    bucket: &str,
    snapshot_id: &str,
    volume_size_gib: u64,
    segment: &Segment,
    payloads: &[Vec<u8>],
) -> Result<String, RpcError> {
    let (key, compressed) = encode_segment(snapshot_id, volume_size_gib, segment, payloads);
    store.put_object(bucket, &key, &compressed)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(i: u32) -> Block {
        Block { index: i, read_token: format!("t{i}"), peer_read_token: None }
    }

    #[test]
    fn pack_splits_on_64_block_boundary() {
        let blocks: Vec<Block> = (0..130).map(block).collect();
        let segments = pack(blocks);
        // 0..64, 64..128, 128..130
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].first_index, 0);
        assert_eq!(segments[0].blocks.len(), 64);
        assert_eq!(segments[1].first_index, 64);
        assert_eq!(segments[1].blocks.len(), 64);
        assert_eq!(segments[2].first_index, 128);
        assert_eq!(segments[2].blocks.len(), 2);
    }

    #[test]
    fn pack_splits_on_noncontiguous_gap() {
        let blocks = vec![block(0), block(1), block(5), block(6)];
        let segments = pack(blocks);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].blocks.len(), 2);
        assert_eq!(segments[1].first_index, 5);
    }

    #[test]
    fn pack_is_idempotent() {
        let blocks: Vec<Block> = (0..200).map(block).collect();
        let a = pack(blocks.clone());
        let b = pack(blocks);
        let keys_a: Vec<u32> = a.iter().map(|s| s.first_index).collect();
        let keys_b: Vec<u32> = b.iter().map(|s| s.first_index).collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn segment_key_round_trips_through_parse_key() {
        let payload = vec![7u8; chunk::CHUNK_SIZE * 3];
        let key = segment_key("snap-1", 16, 128, &payload, 3);
        let parsed = parse_key(&key).unwrap();
        assert_eq!(parsed.snapshot_id, "snap-1");
        assert_eq!(parsed.volume_size_gib, 16);
        assert_eq!(parsed.first_index, 128);
        assert_eq!(parsed.block_count, 3);
        assert_eq!(parsed.hash, chunk::urlsafe_hash(&payload));
    }

    #[test]
    fn parse_key_rejects_non_segment_keys() {
        assert!(parse_key("not-a-segment-key").is_none());
        assert!(parse_key("snap-1.16/not-numeric.hash.3.zstd").is_none());
    }

    #[test]
    fn encode_decode_segment_round_trips() {
        let segment = Segment { first_index: 0, blocks: vec![block(0), block(1)] };
        let payloads = vec![vec![1u8; chunk::CHUNK_SIZE], vec![2u8; chunk::CHUNK_SIZE]];
        let (key, compressed) = encode_segment("snap-1", 1, &segment, &payloads);
        let parsed = parse_key(&key).unwrap();
        let decoded = decode_segment(&parsed, &compressed).unwrap();
        assert_eq!(decoded, payloads);
    }

    #[test]
    fn decode_segment_rejects_hash_mismatch() {
        let segment = Segment { first_index: 0, blocks: vec![block(0)] };
        let payloads = vec![vec![1u8; chunk::CHUNK_SIZE]];
        let (key, compressed) = encode_segment("snap-1", 1, &segment, &payloads);
        let mut parsed = parse_key(&key).unwrap();
        parsed.hash = "tamperedhash".into();
        assert!(decode_segment(&parsed, &compressed).is_err());
    }
}
