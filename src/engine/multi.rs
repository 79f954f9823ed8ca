//! Fan-in/fan-out operations: `multiclone`, `fanout`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk;
use crate::client::retry::RetryingRpc;
use crate::client::ControlPlaneClient;
use crate::config::Config;
use crate::engine::io::{block_count, read_chunk_at, volume_size_gib, write_chunk_at};
use crate::engine::{OperationReport, SparsePolicy};
use crate::error::EngineError;
use crate::executor::{run_sharded, CancellationToken, SharedCounter};
use crate::index::BlockIndexSource;
use crate::preflight;
use crate::threadpool::TPool;

/// `multiclone(snap, path_list)` — like `download`, but each verified
/// non-sparse chunk is written to every path in the list; each task opens
/// each destination afresh.
pub fn multiclone(
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    index: &BlockIndexSource,
    snapshot_id: &str,
    paths: &[PathBuf],
) -> Result<OperationReport, EngineError> {
    let handle = control.describe_snapshot(snapshot_id)?;
    preflight::check_snapshot_readable(&handle)?;
    for path in paths {
        preflight::check_sink_writable(path)?;
    }

    let blocks = index.enumerate(snapshot_id)?;
    let policy = SparsePolicy::resolve(config.full_copy, SparsePolicy::Elide);
    let snapshot_id = snapshot_id.to_owned();
    let paths_for_report = paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(",");
    let paths = paths.to_vec();
    let degree = config.jobs.get();
    let counter = Arc::new(SharedCounter::new());
    let counter_for_closure = Arc::clone(&counter);

    run_sharded(blocks, degree, Arc::new(CancellationToken::new()), move |block: crate::client::Block| {
        let data = rpc.get_verified_block(&snapshot_id, block.index, &block.read_token)?;
        if policy.should_write(chunk::is_sparse(&chunk::hash(&data))) {
            for path in &paths {
                write_chunk_at(path, block.index, &data).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?;
            }
            counter_for_closure.increment();
        }
        Ok(())
    })?;

    Ok(OperationReport::Completed { id: paths_for_report, blocks_written: counter.get() })
}

/// One fanout destination region: its own control-plane and Block API
/// client handles,'s `DestinationSet` (handles are per-shard
/// *and* per-region; shards within a region still build their own handle
/// in `run_sharded`, these are the region-level ones `start_snapshot` and
/// `complete_snapshot` are called on).
pub struct FanoutDestination {
    pub region: String,
    pub control: Arc<dyn ControlPlaneClient>,
    pub rpc: Arc<RetryingRpc>,
}

/// `fanout(local_path, regions[])` — one local reader, N destination
/// snapshots, one per region.
pub fn fanout(
    config: &Config,
    local_path: &Path,
    destinations: Vec<FanoutDestination>,
) -> Result<OperationReport, EngineError> {
    preflight::check_source_readable(local_path)?;

    let total_blocks = block_count(local_path).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?;
    let byte_len = local_path.metadata().map_err(|e| EngineError::LocalIo { detail: e.to_string() })?.len();
    let volume_gib = volume_size_gib(byte_len);

    let mut snapshot_ids: BTreeMap<String, String> = BTreeMap::new();
    let mut counters: BTreeMap<String, Arc<SharedCounter>> = BTreeMap::new();
    let mut regional_rpc: BTreeMap<String, Arc<RetryingRpc>> = BTreeMap::new();
    for dest in &destinations {
        let snapshot_id = dest.control.start_snapshot(&dest.region, volume_gib, None)?;
        snapshot_ids.insert(dest.region.clone(), snapshot_id);
        counters.insert(dest.region.clone(), Arc::new(SharedCounter::new()));
        regional_rpc.insert(dest.region.clone(), Arc::clone(&dest.rpc));
    }

    let policy = SparsePolicy::resolve(config.full_copy, SparsePolicy::Elide);
    let indices: Vec<u32> = (0..total_blocks as u32).collect();
    let path = local_path.to_owned();
    let degree = config.jobs.get();
    let snapshot_ids_for_shards = snapshot_ids.clone();
    let counters_for_shards = counters.clone();
    let regional_rpc_for_shards = regional_rpc.clone();

    run_sharded(indices, degree, Arc::new(CancellationToken::new()), move |index: u32| {
        let data = chunk::pad_to_chunk_size(
            read_chunk_at(&path, index).map_err(|e| EngineError::LocalIo { detail: e.to_string() })?,
        );
        let checksum = chunk::hash(&data);
        if !policy.should_write(chunk::is_sparse(&checksum)) {
            return Ok(());
        }

        // Inner pool of degree N across destinations: every region receives
        // this block concurrently rather than one-at-a-time.
        let inner = TPool::new(degree.max(1), degree.max(1))
            .expect("failed to build inner per-destination pool");
        let data = Arc::new(data);
        let checksum = Arc::new(checksum);
        let first_error: Arc<std::sync::Mutex<Option<crate::error::RpcError>>> =
            Arc::new(std::sync::Mutex::new(None));
        for (region, snapshot_id) in &snapshot_ids_for_shards {
            let rpc = Arc::clone(&regional_rpc_for_shards[region]);
            let snapshot_id = snapshot_id.clone();
            let counter = Arc::clone(&counters_for_shards[region]);
            let data = Arc::clone(&data);
            let checksum = Arc::clone(&checksum);
            let first_error = Arc::clone(&first_error);
            inner.submit_job(Box::new(move || match rpc.put_block(&snapshot_id, index, &data, &checksum) {
                Ok(()) => counter.increment(),
                Err(e) => {
                    let mut slot = first_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            }));
        }
        inner.jobs_completed();
        if let Some(e) = first_error.lock().unwrap().take() {
            return Err(EngineError::Rpc(e));
        }
        Ok(())
    })?;

    for dest in &destinations {
        let snapshot_id = &snapshot_ids[&dest.region];
        let blocks_written = counters[&dest.region].get();
        dest.control.complete_snapshot(snapshot_id, blocks_written)?;
    }

    Ok(OperationReport::Fanout { snapshot_ids })
}

#[cfg(test)]
mod tests {
    #[test]
    fn report_id_joins_multiple_paths_with_comma() {
        let paths = ["/a.img", "/b.img"];
        assert_eq!(paths.join(","), "/a.img,/b.img");
    }
}
