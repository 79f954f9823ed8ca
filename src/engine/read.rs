//! Read-side operations: `list`, `diff`, `download`, `deltadownload`.

use std::path::Path;
use std::sync::Arc;

use crate::chunk::{self, CHUNK_SIZE};
use crate::client::retry::RetryingRpc;
use crate::client::{Block, ControlPlaneClient};
use crate::config::Config;
use crate::engine::io::write_chunk_at;
use crate::engine::{OperationReport, SparsePolicy};
use crate::error::EngineError;
use crate::executor::{run_sharded, CancellationToken, SharedCounter};
use crate::index::BlockIndexSource;
use crate::preflight;

/// `list(snap)` — enumerate metadata only.
pub fn list(
    index: &BlockIndexSource,
    control: &dyn ControlPlaneClient,
    snapshot_id: &str,
) -> Result<OperationReport, EngineError> {
    let handle = control.describe_snapshot(snapshot_id)?;
    preflight::check_snapshot_readable(&handle)?;
    let blocks = index.enumerate(snapshot_id)?;
    Ok(OperationReport::Metadata {
        block_count: blocks.len() as u64,
        byte_count: blocks.len() as u64 * CHUNK_SIZE as u64,
    })
}

/// `diff(snapA, snapB)` — enumerate differential metadata only.
pub fn diff(
    index: &BlockIndexSource,
    control: &dyn ControlPlaneClient,
    snapshot_a: &str,
    snapshot_b: &str,
) -> Result<OperationReport, EngineError> {
    let handle_a = control.describe_snapshot(snapshot_a)?;
    preflight::check_snapshot_readable(&handle_a)?;
    let handle_b = control.describe_snapshot(snapshot_b)?;
    preflight::check_snapshot_readable(&handle_b)?;
    let blocks = index.enumerate_diff(snapshot_a, Some(snapshot_b))?;
    Ok(OperationReport::Metadata {
        block_count: blocks.len() as u64,
        byte_count: blocks.len() as u64 * CHUNK_SIZE as u64,
    })
}

/// `download(snap, path)` —
pub fn download(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    index: &BlockIndexSource,
    snapshot_id: &str,
    path: &Path,
) -> Result<OperationReport, EngineError> {
    let handle = control.describe_snapshot(snapshot_id)?;
    preflight::check_snapshot_readable(&handle)?;
    preflight::check_sink_writable(path)?;

    let blocks = index.enumerate(snapshot_id)?;
    let policy = SparsePolicy::resolve(config.full_copy, SparsePolicy::Elide);
    let snapshot_id = snapshot_id.to_owned();
    let path_for_report = path.display().to_string();
    let path = path.to_owned();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(blocks, degree, Arc::new(CancellationToken::new()), move |block: Block| {
        fetch_and_write(&rpc, &snapshot_id, &path, &block, &block.read_token, policy, &counter_for_closure)
    })?;

    Ok(OperationReport::Completed { id: path_for_report, blocks_written: counter.get() })
}

fn fetch_and_write(
    rpc: &RetryingRpc,
    snapshot_id: &str,
    path: &Path,
    block: &Block,
    read_token: &str,
    policy: SparsePolicy,
    counter: &SharedCounter,
) -> Result<(), EngineError> {
    let data = rpc.get_verified_block(snapshot_id, block.index, read_token)?;
    let is_sparse = chunk::is_sparse(&chunk::hash(&data));
    if policy.should_write(is_sparse) {
        write_chunk_at(path, block.index, &data).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?;
        counter.increment();
    }
    Ok(())
}

/// `deltadownload(snapA, snapB, path)` — sparse suppression disabled; every
/// block is written through regardless of whether it reads as sparse.
pub fn deltadownload(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    index: &BlockIndexSource,
    snapshot_a: &str,
    snapshot_b: &str,
    path: &Path,
) -> Result<OperationReport, EngineError> {
    let handle_a = control.describe_snapshot(snapshot_a)?;
    preflight::check_snapshot_readable(&handle_a)?;
    let handle_b = control.describe_snapshot(snapshot_b)?;
    preflight::check_snapshot_readable(&handle_b)?;
    preflight::check_sink_writable(path)?;

    let blocks = index.enumerate_diff(snapshot_a, Some(snapshot_b))?;
    let snapshot_a = snapshot_a.to_owned();
    let snapshot_b = snapshot_b.to_owned();
    let path_for_report = path.display().to_string();
    let path = path.to_owned();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(blocks, degree, Arc::new(CancellationToken::new()), move |block: Block| {
        let (source_snapshot, token) = match &block.peer_read_token {
            Some(peer) => (snapshot_b.as_str(), peer.as_str()),
            None => (snapshot_a.as_str(), block.read_token.as_str()),
        };
        fetch_and_write(&rpc, source_snapshot, &path, &block, token, SparsePolicy::Write, &counter_for_closure)
    })?;

    Ok(OperationReport::Completed { id: path_for_report, blocks_written: counter.get() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_policy_write_through_overrides_elide_under_full_copy() {
        assert_eq!(SparsePolicy::resolve(true, SparsePolicy::Elide), SparsePolicy::Write);
        assert_eq!(SparsePolicy::resolve(false, SparsePolicy::Elide), SparsePolicy::Elide);
    }

    #[test]
    fn elide_policy_skips_only_sparse_chunks() {
        assert!(!SparsePolicy::Elide.should_write(true));
        assert!(SparsePolicy::Elide.should_write(false));
        assert!(SparsePolicy::Write.should_write(true));
    }
}
