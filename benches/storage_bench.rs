//! Benchmarks for slabkv storage operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slabkv::{Config, Node, FULL_RANGE};
use tempfile::TempDir;

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("put_small_value", |b| {
        let dir = TempDir::new().unwrap();
        let config = Config::builder().data_dir(dir.path()).build();
        let mut node = Node::open(config).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            node.put(&format!("key{i}"), "value").unwrap();
            i += 1;
        });
    });

    c.bench_function("read_small_value", |b| {
        let dir = TempDir::new().unwrap();
        let config = Config::builder().data_dir(dir.path()).build();
        let mut node = Node::open(config).unwrap();
        for i in 0..100 {
            node.put(&format!("key{i}"), "value").unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key{}", i % 100);
            black_box(node.read(&key, true, FULL_RANGE).unwrap());
            i += 1;
        });
    });

    c.bench_function("put_multi_fragment_value", |b| {
        let dir = TempDir::new().unwrap();
        let config = Config::builder().data_dir(dir.path()).build();
        let mut node = Node::open(config).unwrap();
        let value = "x".repeat(8 * 1024);
        let mut i = 0u64;
        b.iter(|| {
            node.put(&format!("key{i}"), &value).unwrap();
            i += 1;
        });
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
