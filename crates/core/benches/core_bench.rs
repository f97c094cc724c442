//! Core performance benchmarks for sift-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sift_core::{diff, hash_bytes, Entry, Metadata, Snapshot};

fn wide_tree(dirs: usize, files_per_dir: usize, generation: u64) -> Snapshot {
    let mut entries = Vec::with_capacity(dirs * (files_per_dir + 1));
    for d in 0..dirs {
        let dir = format!("dir{d:04}");
        for f in 0..files_per_dir {
            // Touch every tenth file between generations
            let mtime_ns = if f % 10 == 0 { generation } else { 0 };
            entries.push(Entry::file(
                format!("{dir}/file{f:04}.txt"),
                Metadata {
                    size: 128,
                    mtime_ns,
                    mode: 0o644,
                },
            ));
        }
        entries.push(Entry::directory(dir));
    }
    Snapshot::from_entries(entries).expect("generated tree is well formed")
}

fn bench_hash_operations(c: &mut Criterion) {
    let small = vec![0x5au8; 512];
    let large = vec![0x5au8; 2 * 1024 * 1024];

    c.bench_function("hash_bytes_small", |b| b.iter(|| hash_bytes(black_box(&small))));
    c.bench_function("hash_bytes_large", |b| b.iter(|| hash_bytes(black_box(&large))));
}

fn bench_diff_operations(c: &mut Criterion) {
    let before = wide_tree(100, 100, 1);
    let after = wide_tree(100, 100, 2);

    c.bench_function("diff_identical_10k", |b| {
        b.iter(|| diff(black_box(&before), black_box(&before)))
    });
    c.bench_function("diff_10pct_changed_10k", |b| {
        b.iter(|| diff(black_box(&before), black_box(&after)))
    });
    c.bench_function("snapshot_build_10k", |b| b.iter(|| wide_tree(100, 100, 1)));
}

criterion_group!(benches, bench_hash_operations, bench_diff_operations);
criterion_main!(benches);
