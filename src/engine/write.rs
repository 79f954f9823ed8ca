//! Write-side operations: `upload`, `copy`, `sync`.
//!
//! Each starts exactly one destination snapshot, drives shard workers that
//! put non-sparse chunks, then calls `complete_snapshot` once with the
//! final counter value.

use std::path::Path;
use std::sync::Arc;

use crate::chunk;
use crate::client::retry::RetryingRpc;
use crate::client::{Block, ControlPlaneClient};
use crate::config::Config;
use crate::engine::io::{block_count, read_chunk_at, volume_size_gib};
use crate::engine::{OperationReport, SparsePolicy};
use crate::error::EngineError;
use crate::executor::{run_sharded, CancellationToken, SharedCounter};
use crate::index::BlockIndexSource;
use crate::preflight;

/// `upload(path, parent?)` —
pub fn upload(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    path: &Path,
    parent_snapshot_id: Option<&str>,
) -> Result<OperationReport, EngineError> {
    preflight::check_source_readable(path)?;

    let total_blocks = block_count(path).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?;
    let byte_len = path.metadata().map_err(|e| EngineError::LocalIo { detail: e.to_string() })?.len();
    let volume_gib = volume_size_gib(byte_len);

    let snapshot_id = control.start_snapshot(&config.dest_region, volume_gib, parent_snapshot_id)?;

    let policy = SparsePolicy::resolve(config.full_copy, SparsePolicy::Elide);
    let indices: Vec<u32> = (0..total_blocks as u32).collect();
    let path = path.to_owned();
    let snapshot_id_for_shards = snapshot_id.clone();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(indices, degree, Arc::new(CancellationToken::new()), move |index: u32| {
        let data = chunk::pad_to_chunk_size(
            read_chunk_at(&path, index).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?,
        );
        let checksum = chunk::hash(&data);
        if policy.should_write(chunk::is_sparse(&checksum)) {
            rpc.put_block(&snapshot_id_for_shards, index, &data, &checksum)?;
            counter_for_closure.increment();
        }
        Ok(())
    })?;

    control.complete_snapshot(&snapshot_id, counter.get())?;
    Ok(OperationReport::Completed { id: snapshot_id, blocks_written: counter.get() })
}

/// `copy(snap, dest_region?)` —
pub fn copy(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    index: &BlockIndexSource,
    snapshot_id: &str,
) -> Result<OperationReport, EngineError> {
    let source_handle = control.describe_snapshot(snapshot_id)?;
    preflight::check_snapshot_readable(&source_handle)?;

    let dest_snapshot_id = control.start_snapshot(&config.dest_region, source_handle.volume_size_gib, None)?;

    let blocks = index.enumerate(snapshot_id)?;
    let policy = SparsePolicy::resolve(config.full_copy, SparsePolicy::Elide);
    let source_snapshot_id = snapshot_id.to_owned();
    let dest_snapshot_id_for_shards = dest_snapshot_id.clone();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(blocks, degree, Arc::new(CancellationToken::new()), move |block: Block| {
        let data = rpc.get_verified_block(&source_snapshot_id, block.index, &block.read_token)?;
        let checksum = chunk::hash(&data);
        if policy.should_write(chunk::is_sparse(&checksum)) {
            rpc.put_block(&dest_snapshot_id_for_shards, block.index, &data, &checksum)?;
            counter_for_closure.increment();
        }
        Ok(())
    })?;

    control.complete_snapshot(&dest_snapshot_id, counter.get())?;
    Ok(OperationReport::Completed { id: dest_snapshot_id, blocks_written: counter.get() })
}

/// `sync(snapA, snapB, parent_in_dest)` — differential traversal from
/// `snapB`, written to a destination snapshot parented on `parent_in_dest`
/// and sized to `snapA`. Sparse suppression is disabled, as
/// for every differential read.
pub fn sync(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    index: &BlockIndexSource,
    snapshot_a: &str,
    snapshot_b: &str,
    parent_in_dest: &str,
) -> Result<OperationReport, EngineError> {
    let handle_a = control.describe_snapshot(snapshot_a)?;
    preflight::check_snapshot_readable(&handle_a)?;
    let handle_b = control.describe_snapshot(snapshot_b)?;
    preflight::check_snapshot_readable(&handle_b)?;

    let dest_snapshot_id =
        control.start_snapshot(&config.dest_region, handle_a.volume_size_gib, Some(parent_in_dest))?;

    let blocks = index.enumerate_diff(snapshot_a, Some(snapshot_b))?;
    let snapshot_a = snapshot_a.to_owned();
    let snapshot_b = snapshot_b.to_owned();
    let dest_snapshot_id_for_shards = dest_snapshot_id.clone();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(blocks, degree, Arc::new(CancellationToken::new()), move |block: Block| {
        let (source_snapshot, token) = match &block.peer_read_token {
            Some(peer) => (snapshot_b.as_str(), peer.as_str()),
            None => (snapshot_a.as_str(), block.read_token.as_str()),
        };
        let data = rpc.get_verified_block(source_snapshot, block.index, token)?;
        let checksum = chunk::hash(&data);
        rpc.put_block(&dest_snapshot_id_for_shards, block.index, &data, &checksum)?;
        counter_for_closure.increment();
        Ok(())
    })?;

    control.complete_snapshot(&dest_snapshot_id, counter.get())?;
    Ok(OperationReport::Completed { id: dest_snapshot_id, blocks_written: counter.get() })
}

#[cfg(test)]
mod tests {
    #[test]
    fn upload_block_indices_cover_whole_file() {
        let total_blocks = 5u32;
        let indices: Vec<u32> = (0..total_blocks).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
