//! Throughput of the per-chunk checksum/compression codec and of segment
//! packing, the two hot paths every block and every object-store segment
//! passes through.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use snapblock::chunk::{self, CHUNK_SIZE};
use snapblock::client::Block;
use snapblock::segment;

fn block(i: u32) -> Block {
    Block { index: i, read_token: format!("t{i}"), peer_read_token: None }
}

fn bench_hash(c: &mut Criterion) {
    let data = vec![0x5au8; CHUNK_SIZE];
    let mut group = c.benchmark_group("chunk_hash");
    group.throughput(Throughput::Bytes(CHUNK_SIZE as u64));
    group.bench_function("sha256_standard_b64", |b| b.iter(|| chunk::hash(black_box(&data))));
    group.bench_function("sha256_urlsafe_b64", |b| b.iter(|| chunk::urlsafe_hash(black_box(&data))));
    group.finish();
}

fn bench_compress(c: &mut Criterion) {
    // Semi-compressible payload: zero runs interleaved with a repeating
    // byte, closer to a real disk image than either pure zeros or random
    // noise.
    let mut data = vec![0u8; CHUNK_SIZE];
    for (i, b) in data.iter_mut().enumerate() {
        if i % 64 < 8 {
            *b = (i % 251) as u8;
        }
    }

    let mut group = c.benchmark_group("chunk_compress");
    group.throughput(Throughput::Bytes(CHUNK_SIZE as u64));
    group.bench_function("zstd_level1_compress", |b| b.iter(|| chunk::compress(black_box(&data))));

    let compressed = chunk::compress(&data);
    group.bench_function("zstd_level1_decompress", |b| b.iter(|| chunk::decompress(black_box(&compressed)).unwrap()));
    group.finish();
}

fn bench_segment_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_pack");
    for &block_count in &[64u32, 640, 6400] {
        let blocks: Vec<Block> = (0..block_count).map(block).collect();
        group.throughput(Throughput::Elements(block_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(block_count), &blocks, |b, blocks| {
            b.iter(|| segment::pack(black_box(blocks.clone())))
        });
    }
    group.finish();
}

fn bench_segment_encode(c: &mut Criterion) {
    let segment = segment::Segment { first_index: 0, blocks: (0..64).map(block).collect() };
    let payloads: Vec<Vec<u8>> = (0..64).map(|i| vec![(i % 200) as u8; CHUNK_SIZE]).collect();

    let mut group = c.benchmark_group("segment_encode");
    group.throughput(Throughput::Bytes(64 * CHUNK_SIZE as u64));
    group.bench_function("encode_64_block_segment", |b| {
        b.iter(|| segment::encode_segment(black_box("snap-1"), black_box(16), black_box(&segment), black_box(&payloads)))
    });
    group.finish();
}

criterion_group!(benches, bench_hash, bench_compress, bench_segment_pack, bench_segment_encode);
criterion_main!(benches);
