use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dvs_core::hash::{hash_bytes, hash_file, ChecksumEngine, SymlinkPolicy};
use std::sync::Arc;

fn bench_hash_bytes(c: &mut Criterion) {
    let data = vec![0x5au8; 1024 * 1024];
    let mut group = c.benchmark_group("hash_bytes");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1MiB", |b| b.iter(|| hash_bytes(black_box(&data))));
    group.finish();
}

fn bench_hash_file(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("hash_file");
    for size in [64 * 1024, 8 * 1024 * 1024] {
        let path = temp_dir.path().join(format!("file-{}", size));
        std::fs::write(&path, vec![0xa5u8; size]).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{}B", size), |b| {
            b.iter(|| hash_file(black_box(&path)).unwrap())
        });
    }
    group.finish();
}

fn bench_hash_dir(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path().join("data");
    for i in 0..500 {
        let sub = dir.join(format!("shard-{}", i % 10));
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join(format!("file-{}", i)), format!("content {}", i)).unwrap();
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let engine = ChecksumEngine::new(SymlinkPolicy::Follow, Arc::new(pool));
    c.bench_function("hash_dir_500_files", |b| {
        b.iter(|| engine.hash_dir(black_box(&dir)).unwrap())
    });
}

criterion_group!(benches, bench_hash_bytes, bench_hash_file, bench_hash_dir);
criterion_main!(benches);
