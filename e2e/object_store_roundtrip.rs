//! S4 — `movetos3` followed by `getfroms3` reproduces the source
//! snapshot's non-sparse content exactly.

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use snapblock::chunk::CHUNK_SIZE;
use snapblock::client::retry::RetryingRpc;
use snapblock::client::{BlockApiClient, ControlPlaneClient, ObjectStoreClient};
use snapblock::diagnostics::CapturingSink;
use snapblock::engine::{self, OperationReport};
use snapblock::index::BlockIndexSource;

use support::{test_config, MockCloud, MockObjectStore};

#[test]
fn movetos3_then_getfroms3_reproduces_source_snapshot() {
    // 70 chunks crosses one 64-block segment boundary (spec.md §4.6).
    let total_chunks = 70u32;
    let blocks: Vec<(u32, Vec<u8>)> = (0..total_chunks).map(|i| (i, vec![(i % 250) as u8; CHUNK_SIZE])).collect();

    let cloud = Arc::new(MockCloud::new());
    cloud.seed_snapshot("snap-1", 1, blocks.clone());
    let store = Arc::new(MockObjectStore::new());

    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let object_store: Arc<dyn ObjectStoreClient> = store.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink.clone()));
    let index = BlockIndexSource::new(Arc::clone(&rpc));
    let config = test_config(4, "us-east-1", false);

    let move_report =
        engine::move_to_s3(Arc::clone(&rpc), control.as_ref(), Arc::clone(&object_store), &index, "snap-1", "bucket-1")
            .unwrap();
    match move_report {
        OperationReport::Completed { id, blocks_written } => {
            assert_eq!(id, "bucket-1/snap-1");
            assert_eq!(blocks_written, total_chunks as u64);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    // 70 blocks / 64 per segment = 2 segment objects.
    assert_eq!(store.object_count("bucket-1"), 2);

    let get_report = engine::get_from_s3(
        &config,
        Arc::clone(&rpc),
        control.as_ref(),
        object_store,
        sink,
        "bucket-1",
        "snap-1.1/",
    )
    .unwrap();
    let restored_snapshot_id = match get_report {
        OperationReport::Completed { id, blocks_written } => {
            assert_eq!(blocks_written, total_chunks as u64);
            id
        }
        other => panic!("expected Completed, got {other:?}"),
    };

    for (index, data) in &blocks {
        assert_eq!(cloud.block_data(&restored_snapshot_id, *index).as_ref(), Some(data));
    }
}
