//! Benchmarks for core engine operations.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;
use trellisdb::{
    CollectionId, CollectionSpec, Config, DenseIndexConfig, DistanceMetric, TrellisDb, UserId,
    VectorId, VectorRecord, ROOT_USERNAME,
};

fn make_vector(seed: u64, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
        .collect()
}

fn setup(dim: usize, count: u64) -> (tempfile::TempDir, TrellisDb, UserId, CollectionId) {
    let dir = tempdir().unwrap();
    let db = TrellisDb::open(dir.path().join("bench.db"), Config::default()).unwrap();
    let root = db.user_id(ROOT_USERNAME).unwrap();
    let docs = db
        .create_collection(root, CollectionSpec::named("bench"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(dim, DistanceMetric::Cosine))
        .unwrap();

    let txn = db.create_transaction(root, docs.id).unwrap();
    for id in 0..count {
        db.stage_create(
            root,
            docs.id,
            txn,
            VectorRecord::dense(VectorId(id), make_vector(id, dim)),
        )
        .unwrap();
    }
    db.commit_transaction(root, docs.id, txn).unwrap();
    (dir, db, root, docs.id)
}

fn bench_commit_batch(c: &mut Criterion) {
    c.bench_function("commit_100_dense_vectors", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for round in 0..iters {
                let (dir, db, root, docs) = setup(32, 0);
                let txn = db.create_transaction(root, docs).unwrap();
                for id in 0..100u64 {
                    db.stage_create(
                        root,
                        docs,
                        txn,
                        VectorRecord::dense(VectorId(round * 1000 + id), make_vector(id, 32)),
                    )
                    .unwrap();
                }
                let start = std::time::Instant::now();
                db.commit_transaction(root, docs, txn).unwrap();
                total += start.elapsed();
                db.close().unwrap();
                drop(dir);
            }
            total
        });
    });
}

fn bench_dense_search(c: &mut Criterion) {
    let (_dir, db, root, docs) = setup(32, 1_000);
    let query = make_vector(500, 32);

    c.bench_function("dense_search_top10_of_1k", |b| {
        b.iter(|| {
            let hits = db.search_dense(root, docs, &query, 10).unwrap();
            assert_eq!(hits.len(), 10);
        });
    });
}

fn bench_get_vector(c: &mut Criterion) {
    let (_dir, db, root, docs) = setup(8, 1_000);

    c.bench_function("get_vector_of_1k", |b| {
        b.iter(|| {
            let record = db.get_vector(root, docs, VectorId(512)).unwrap();
            assert_eq!(record.id, VectorId(512));
        });
    });
}

criterion_group!(benches, bench_commit_batch, bench_dense_search, bench_get_vector);
criterion_main!(benches);
