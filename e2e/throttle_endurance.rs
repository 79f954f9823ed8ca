//! S6 — a Block API that fails the first two calls per block with a
//! throttle code, then succeeds. `download` completes with correct data
//! and emits exactly one diagnostic line per block (first-retry-silent).

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use snapblock::chunk::CHUNK_SIZE;
use snapblock::client::retry::RetryingRpc;
use snapblock::client::{BlockApiClient, ControlPlaneClient};
use snapblock::diagnostics::CapturingSink;
use snapblock::engine::{self, OperationReport};
use snapblock::index::BlockIndexSource;

use support::{test_config, write_patterned_device, MockCloud, ThrottlingBlockApiClient};

#[test]
fn download_survives_two_throttles_per_block_with_one_log_line_each() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.img");
    let dest_path = dir.path().join("dest.img");
    let chunks = 5u32;
    write_patterned_device(&source_path, chunks, 1);

    let cloud = Arc::new(MockCloud::new());
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    // Uploads go straight through the untouched mock; only reads are throttled.
    let upload_block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let upload_sink = Arc::new(CapturingSink::new());
    let upload_rpc = Arc::new(RetryingRpc::new(upload_block_api, upload_sink));
    let config = test_config(2, "us-east-1", false);
    let upload_report =
        engine::upload(&config, upload_rpc, control.as_ref(), &source_path, None).unwrap();
    let snapshot_id = match upload_report {
        OperationReport::Completed { id, .. } => id,
        other => panic!("expected Completed, got {other:?}"),
    };

    let throttling: Arc<dyn BlockApiClient> = Arc::new(ThrottlingBlockApiClient::new(cloud.clone(), 2));
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(throttling, sink.clone()));
    let index = BlockIndexSource::new(Arc::clone(&rpc));

    std::fs::File::create(&dest_path).unwrap().set_len(chunks as u64 * CHUNK_SIZE as u64).unwrap();
    let report = engine::download(&config, rpc, control.as_ref(), &index, &snapshot_id, &dest_path).unwrap();
    match report {
        OperationReport::Completed { blocks_written, .. } => assert_eq!(blocks_written, chunks as u64),
        other => panic!("expected Completed, got {other:?}"),
    }

    assert_eq!(std::fs::read(&source_path).unwrap(), std::fs::read(&dest_path).unwrap());

    let lines = sink.lines();
    assert_eq!(lines.len(), chunks as usize, "expected exactly one retry line per block, got: {lines:?}");
    assert!(lines.iter().all(|l| l.contains("get_block") && l.contains("snapshot-throttle") && l.contains("retry=1")));
}
