//! S3 — sparse elision. Uploading an all-zero file with `full_copy = false`
//! writes nothing; with `full_copy = true` every chunk is written through.

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use snapblock::chunk::CHUNK_SIZE;
use snapblock::client::retry::RetryingRpc;
use snapblock::client::{BlockApiClient, ControlPlaneClient};
use snapblock::diagnostics::CapturingSink;
use snapblock::engine::{self, OperationReport};
use snapblock::index::BlockIndexSource;

use support::{test_config, MockCloud};

fn zero_file(dir: &std::path::Path, chunks: u64) -> std::path::PathBuf {
    let path = dir.join("zero.img");
    std::fs::File::create(&path).unwrap().set_len(chunks * CHUNK_SIZE as u64).unwrap();
    path
}

#[test]
fn elide_policy_writes_zero_blocks_for_an_all_zero_file() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = 4u64;
    let path = zero_file(dir.path(), chunks);

    let cloud = Arc::new(MockCloud::new());
    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink));
    let config = test_config(2, "us-east-1", false);

    let report = engine::upload(&config, Arc::clone(&rpc), control.as_ref(), &path, None).unwrap();
    let snapshot_id = match report {
        OperationReport::Completed { id, blocks_written } => {
            assert_eq!(blocks_written, 0);
            id
        }
        other => panic!("expected Completed, got {other:?}"),
    };
    assert_eq!(cloud.blocks_written(&snapshot_id), 0);

    let index = BlockIndexSource::new(rpc);
    let list_report = engine::list(&index, control.as_ref(), &snapshot_id).unwrap();
    match list_report {
        OperationReport::Metadata { block_count, .. } => assert_eq!(block_count, 0),
        other => panic!("expected Metadata, got {other:?}"),
    }
}

#[test]
fn full_copy_writes_every_chunk_even_when_all_zero() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = 4u64;
    let path = zero_file(dir.path(), chunks);

    let cloud = Arc::new(MockCloud::new());
    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink));
    let config = test_config(2, "us-east-1", true);

    let report = engine::upload(&config, rpc, control.as_ref(), &path, None).unwrap();
    match report {
        OperationReport::Completed { blocks_written, id } => {
            assert_eq!(blocks_written, chunks);
            assert_eq!(cloud.blocks_written(&id), chunks as usize);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}
