//! S2 — differential diff/download. `diff` reports exactly the sectors
//! that differ; `deltadownload` applied on top of a full download of
//! snapshot A reproduces snapshot B's content at those indices.

#[path = "support.rs"]
mod support;

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use snapblock::chunk::CHUNK_SIZE;
use snapblock::client::retry::RetryingRpc;
use snapblock::client::{BlockApiClient, ControlPlaneClient};
use snapblock::diagnostics::CapturingSink;
use snapblock::engine::{self, OperationReport};
use snapblock::index::BlockIndexSource;

use support::{test_config, MockCloud};

fn read_chunk(path: &std::path::Path, index: u32) -> Vec<u8> {
    let mut file = std::fs::File::open(path).unwrap();
    file.seek(SeekFrom::Start(index as u64 * CHUNK_SIZE as u64)).unwrap();
    let mut buf = vec![0u8; CHUNK_SIZE];
    file.read_exact(&mut buf).unwrap();
    buf
}

#[test]
fn diff_reports_exactly_the_changed_indices_and_deltadownload_reproduces_b() {
    let total_chunks = 6u32;
    let changed_indices = [2u32, 4u32];

    let blocks_a: Vec<(u32, Vec<u8>)> = (0..total_chunks).map(|i| (i, vec![(i + 1) as u8; CHUNK_SIZE])).collect();
    let blocks_b: Vec<(u32, Vec<u8>)> = (0..total_chunks)
        .map(|i| {
            let data = if changed_indices.contains(&i) {
                vec![(100 + i) as u8; CHUNK_SIZE]
            } else {
                vec![(i + 1) as u8; CHUNK_SIZE]
            };
            (i, data)
        })
        .collect();

    let cloud = Arc::new(MockCloud::new());
    cloud.seed_snapshot("snap-a", 1, blocks_a.clone());
    cloud.seed_snapshot("snap-b", 1, blocks_b.clone());

    let block_api: Arc<dyn BlockApiClient> = cloud.clone();
    let control: Arc<dyn ControlPlaneClient> = cloud.clone();
    let sink = Arc::new(CapturingSink::new());
    let rpc = Arc::new(RetryingRpc::new(block_api, sink));
    let index = BlockIndexSource::new(Arc::clone(&rpc));
    let config = test_config(2, "us-east-1", false);

    let diff_report = engine::diff(&index, control.as_ref(), "snap-a", "snap-b").unwrap();
    match diff_report {
        OperationReport::Metadata { block_count, .. } => assert_eq!(block_count, changed_indices.len() as u64),
        other => panic!("expected Metadata, got {other:?}"),
    }

    let dir = tempfile::tempdir().unwrap();
    let dev_a = dir.path().join("dev-a.img");
    std::fs::File::create(&dev_a).unwrap().set_len(total_chunks as u64 * CHUNK_SIZE as u64).unwrap();
    engine::download(&config, Arc::clone(&rpc), control.as_ref(), &index, "snap-a", &dev_a).unwrap();

    engine::deltadownload(&config, rpc, control.as_ref(), &index, "snap-a", "snap-b", &dev_a).unwrap();

    for i in 0..total_chunks {
        let expected = if changed_indices.contains(&i) { &blocks_b[i as usize].1 } else { &blocks_a[i as usize].1 };
        assert_eq!(&read_chunk(&dev_a, i), expected, "chunk {i} mismatch after deltadownload");
    }
}
