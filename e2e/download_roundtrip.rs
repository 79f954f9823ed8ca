//! S1 — upload a local device, download the resulting snapshot back, and
//! assert the two devices are byte-identical.

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use snapblock::chunk::CHUNK_SIZE;
use snapblock::client::retry::RetryingRpc;
use snapblock::client::{BlockApiClient, ControlPlaneClient};
use snapblock::diagnostics::CapturingSink;
use snapblock::engine::{self, OperationReport};
use snapblock::index::BlockIndexSource;

use support::{test_config, write_patterned_device, MockCloud};

#[test]
fn upload_then_download_round_trips_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.img");
    let dest_path = dir.path().join("dest.img");
    let chunks = 6;
    write_patterned_device(&source_path, chunks, 1);

    let cloud = Arc::new(MockCloud::new());
    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink));
    let config = test_config(3, "us-east-1", false);

    let upload_report = engine::upload(&config, Arc::clone(&rpc), control.as_ref(), &source_path, None).unwrap();
    let snapshot_id = match upload_report {
        OperationReport::Completed { id, blocks_written } => {
            assert_eq!(blocks_written, chunks as u64);
            id
        }
        other => panic!("expected Completed, got {other:?}"),
    };

    std::fs::File::create(&dest_path).unwrap().set_len(chunks as u64 * CHUNK_SIZE as u64).unwrap();
    let index = BlockIndexSource::new(Arc::clone(&rpc));
    let download_report =
        engine::download(&config, rpc, control.as_ref(), &index, &snapshot_id, &dest_path).unwrap();
    match download_report {
        OperationReport::Completed { blocks_written, .. } => assert_eq!(blocks_written, chunks as u64),
        other => panic!("expected Completed, got {other:?}"),
    }

    let source_bytes = std::fs::read(&source_path).unwrap();
    let dest_bytes = std::fs::read(&dest_path).unwrap();
    assert_eq!(source_bytes, dest_bytes);
}

#[test]
fn list_reports_block_and_byte_counts_without_writing() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_snapshot("snap-1", 1, vec![(0, vec![1u8; CHUNK_SIZE]), (1, vec![2u8; CHUNK_SIZE])]);
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink));
    let index = BlockIndexSource::new(rpc);

    let report = engine::list(&index, control.as_ref(), "snap-1").unwrap();
    match report {
        OperationReport::Metadata { block_count, byte_count } => {
            assert_eq!(block_count, 2);
            assert_eq!(byte_count, 2 * CHUNK_SIZE as u64);
        }
        other => panic!("expected Metadata, got {other:?}"),
    }
}
