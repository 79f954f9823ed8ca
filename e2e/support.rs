//! In-memory mock implementations of the Block API, control-plane, and
//! object-store traits, shared by every end-to-end test in this directory.
//!
//! Each test brings this file in via `#[path = "support.rs"] mod support;`
//! rather than depending on a shared crate, since each `[[test]]` target in
//! `Cargo.toml` is its own binary.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use snapblock::chunk;
use snapblock::client::{
    Block, BlockApiClient, BlockPage, BucketAcl, ControlPlaneClient, ObjectBytes, ObjectStoreClient,
    SnapshotHandle, SnapshotState,
};
use snapblock::error::RpcError;

/// Page size used by every mock listing, small enough that even a
/// few-dozen-block test snapshot spans multiple pages.
pub const PAGE_SIZE: usize = 8;

struct SnapshotEntry {
    volume_size_gib: u64,
    state: SnapshotState,
    progress_percent: u8,
    /// index -> (data, checksum)
    blocks: BTreeMap<u32, (Vec<u8>, String)>,
}

/// One in-memory cloud: snapshots plus their blocks. Implements both
/// [`BlockApiClient`] and [`ControlPlaneClient`]; a test upcasts one
/// `Arc<MockCloud>` to each trait object it needs so both sides observe the
/// same snapshot state.
#[derive(Default)]
pub struct MockCloud {
    snapshots: Mutex<HashMap<String, SnapshotEntry>>,
    next_id: AtomicU64,
}

impl MockCloud {
    pub fn new() -> Self {
        MockCloud::default()
    }

    /// Seeds a fully-completed, readable snapshot with the given block
    /// payloads (index -> raw bytes). Checksums are computed from the data,
    /// matching what a real Block API would report.
    pub fn seed_snapshot(&self, snapshot_id: &str, volume_size_gib: u64, blocks: Vec<(u32, Vec<u8>)>) {
        let mut map = BTreeMap::new();
        for (index, data) in blocks {
            let checksum = chunk::hash(&data);
            map.insert(index, (data, checksum));
        }
        self.snapshots.lock().unwrap().insert(
            snapshot_id.to_owned(),
            SnapshotEntry { volume_size_gib, state: SnapshotState::Completed, progress_percent: 100, blocks: map },
        );
    }

    /// Seeds a snapshot preflight will reject (not yet complete).
    pub fn seed_pending_snapshot(&self, snapshot_id: &str, volume_size_gib: u64, progress_percent: u8) {
        self.snapshots.lock().unwrap().insert(
            snapshot_id.to_owned(),
            SnapshotEntry {
                volume_size_gib,
                state: SnapshotState::Pending,
                progress_percent,
                blocks: BTreeMap::new(),
            },
        );
    }

    pub fn blocks_written(&self, snapshot_id: &str) -> usize {
        self.snapshots.lock().unwrap().get(snapshot_id).map(|s| s.blocks.len()).unwrap_or(0)
    }

    pub fn block_data(&self, snapshot_id: &str, index: u32) -> Option<Vec<u8>> {
        self.snapshots.lock().unwrap().get(snapshot_id)?.blocks.get(&index).map(|(d, _)| d.clone())
    }

    fn page(blocks: &[Block], cursor: Option<&str>) -> BlockPage {
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + PAGE_SIZE).min(blocks.len());
        let next_cursor = if end < blocks.len() { Some(end.to_string()) } else { None };
        BlockPage { blocks: blocks[start..end].to_vec(), next_cursor }
    }
}

impl BlockApiClient for MockCloud {
    fn get_block(&self, snapshot_id: &str, index: u32, _read_token: &str) -> Result<(Vec<u8>, String), RpcError> {
        let snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots
            .get(snapshot_id)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_id}") })?;
        entry
            .blocks
            .get(&index)
            .cloned()
            .ok_or_else(|| RpcError::Validation { detail: format!("no block {index} in {snapshot_id}") })
    }

    fn put_block(&self, snapshot_id: &str, index: u32, data: &[u8], checksum: &str) -> Result<(), RpcError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots.entry(snapshot_id.to_owned()).or_insert_with(|| SnapshotEntry {
            volume_size_gib: 0,
            state: SnapshotState::Pending,
            progress_percent: 0,
            blocks: BTreeMap::new(),
        });
        entry.blocks.insert(index, (data.to_vec(), checksum.to_owned()));
        Ok(())
    }

    fn list_blocks(&self, snapshot_id: &str, cursor: Option<&str>) -> Result<BlockPage, RpcError> {
        let snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots
            .get(snapshot_id)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_id}") })?;
        let all: Vec<Block> = entry
            .blocks
            .keys()
            .map(|&index| Block { index, read_token: format!("rt-{index}"), peer_read_token: None })
            .collect();
        Ok(Self::page(&all, cursor))
    }

    fn list_changed_blocks(&self, snapshot_a: &str, snapshot_b: &str, cursor: Option<&str>) -> Result<BlockPage, RpcError> {
        let snapshots = self.snapshots.lock().unwrap();
        let a = snapshots
            .get(snapshot_a)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_a}") })?;
        let b = snapshots
            .get(snapshot_b)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_b}") })?;

        let mut indices: Vec<u32> = a.blocks.keys().chain(b.blocks.keys()).copied().collect();
        indices.sort_unstable();
        indices.dedup();

        let changed: Vec<Block> = indices
            .into_iter()
            .filter(|index| a.blocks.get(index).map(|(d, _)| d) != b.blocks.get(index).map(|(d, _)| d))
            .map(|index| Block {
                index,
                read_token: format!("rt-{index}"),
                peer_read_token: b.blocks.contains_key(&index).then(|| format!("peer-rt-{index}")),
            })
            .collect();
        Ok(Self::page(&changed, cursor))
    }
}

impl ControlPlaneClient for MockCloud {
    fn describe_snapshot(&self, snapshot_id: &str) -> Result<SnapshotHandle, RpcError> {
        let snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots
            .get(snapshot_id)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_id}") })?;
        Ok(SnapshotHandle {
            id: snapshot_id.to_owned(),
            volume_size_gib: entry.volume_size_gib,
            state: entry.state,
            progress_percent: entry.progress_percent,
        })
    }

    fn describe_regions(&self) -> Result<Vec<String>, RpcError> {
        Ok(vec!["us-east-1".into(), "us-west-2".into(), "eu-west-1".into()])
    }

    fn start_snapshot(&self, region: &str, volume_size_gib: u64, parent_snapshot_id: Option<&str>) -> Result<String, RpcError> {
        let _ = parent_snapshot_id;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let snapshot_id = format!("{region}-snap-{id}");
        self.snapshots.lock().unwrap().insert(
            snapshot_id.clone(),
            SnapshotEntry { volume_size_gib, state: SnapshotState::Pending, progress_percent: 0, blocks: BTreeMap::new() },
        );
        Ok(snapshot_id)
    }

    fn complete_snapshot(&self, snapshot_id: &str, changed_blocks_count: u64) -> Result<(), RpcError> {
        let _ = changed_blocks_count;
        let mut snapshots = self.snapshots.lock().unwrap();
        let entry = snapshots
            .get_mut(snapshot_id)
            .ok_or_else(|| RpcError::Validation { detail: format!("unknown snapshot {snapshot_id}") })?;
        entry.state = SnapshotState::Completed;
        entry.progress_percent = 100;
        Ok(())
    }
}

/// An in-memory object store backing `movetos3`/`getfroms3`.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    acl: Mutex<HashMap<String, BucketAcl>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        MockObjectStore::default()
    }

    pub fn set_acl(&self, bucket: &str, acl: BucketAcl) {
        self.acl.lock().unwrap().insert(bucket.to_owned(), acl);
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.objects.lock().unwrap().get(bucket).map(HashMap::len).unwrap_or(0)
    }
}

impl ObjectStoreClient for MockObjectStore {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), RpcError> {
        self.objects.lock().unwrap().entry(bucket.to_owned()).or_default().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBytes, RpcError> {
        self.objects
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|m| m.get(key))
            .cloned()
            .map(ObjectBytes)
            .ok_or_else(|| RpcError::Validation { detail: format!("no object {bucket}/{key}") })
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, RpcError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(bucket)
            .map(|m| m.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
            .unwrap_or_default())
    }

    fn bucket_acl(&self, bucket: &str) -> Option<BucketAcl> {
        self.acl.lock().unwrap().get(bucket).copied()
    }
}

/// Wraps an inner [`BlockApiClient`] and fails the first `fail_times` calls
/// to `get_block` for each `(snapshot_id, index)` pair with
/// `SnapshotThrottle`, succeeding thereafter — the S6 throttle-endurance
/// scenario's injected fault.
pub struct ThrottlingBlockApiClient {
    inner: std::sync::Arc<dyn BlockApiClient>,
    fail_times: usize,
    attempts: Mutex<HashMap<(String, u32), usize>>,
}

impl ThrottlingBlockApiClient {
    pub fn new(inner: std::sync::Arc<dyn BlockApiClient>, fail_times: usize) -> Self {
        ThrottlingBlockApiClient { inner, fail_times, attempts: Mutex::new(HashMap::new()) }
    }
}

impl BlockApiClient for ThrottlingBlockApiClient {
    fn get_block(&self, snapshot_id: &str, index: u32, read_token: &str) -> Result<(Vec<u8>, String), RpcError> {
        {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry((snapshot_id.to_owned(), index)).or_insert(0);
            if *n < self.fail_times {
                *n += 1;
                return Err(RpcError::SnapshotThrottle { quota_handle: "read-iops".into() });
            }
        }
        self.inner.get_block(snapshot_id, index, read_token)
    }

    fn put_block(&self, snapshot_id: &str, index: u32, data: &[u8], checksum: &str) -> Result<(), RpcError> {
        self.inner.put_block(snapshot_id, index, data, checksum)
    }

    fn list_blocks(&self, snapshot_id: &str, cursor: Option<&str>) -> Result<BlockPage, RpcError> {
        self.inner.list_blocks(snapshot_id, cursor)
    }

    fn list_changed_blocks(&self, snapshot_a: &str, snapshot_b: &str, cursor: Option<&str>) -> Result<BlockPage, RpcError> {
        self.inner.list_changed_blocks(snapshot_a, snapshot_b, cursor)
    }
}

/// A minimal but fully-populated [`snapblock::config::Config`] for tests,
/// with `jobs` overridden to a small, deterministic degree rather than the
/// production same-/cross-region defaults.
pub fn test_config(jobs: usize, dest_region: &str, full_copy: bool) -> snapblock::config::Config {
    snapblock::config::Config {
        account_id: "111122223333".into(),
        user_id: "AIDAEXAMPLE".into(),
        canonical_user_id: "canonical-example".into(),
        source_region: "us-east-1".into(),
        dest_region: dest_region.into(),
        jobs: std::num::NonZeroUsize::new(jobs).expect("jobs must be nonzero"),
        full_copy,
        bucket: None,
        object_store_endpoint_url: None,
        object_store_profile: None,
        verbosity: 0,
        dry_run: false,
        nodeps: false,
    }
}

/// Writes a device whose every 512-byte sector starts with its absolute
/// sector index as a big-endian `u32`, per spec.md §8's S1 pattern — scaled
/// down to a handful of chunks rather than the full 1 GiB scenario.
pub fn write_patterned_device(path: &std::path::Path, chunks: u32, stride: u32) {
    use std::io::Write;
    let mut file = std::fs::File::create(path).unwrap();
    let sectors_per_chunk = (chunk::CHUNK_SIZE / 512) as u32;
    for chunk_index in 0..chunks {
        for sector in 0..sectors_per_chunk {
            let sector_index = chunk_index * sectors_per_chunk + sector;
            let mut buf = [0u8; 512];
            if sector_index % stride == 0 {
                buf[..4].copy_from_slice(&sector_index.to_be_bytes());
            }
            file.write_all(&buf).unwrap();
        }
    }
}
