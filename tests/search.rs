//! Integration tests for the read path: point reads and similarity
//! search over committed state across all three index kinds.

use tempfile::tempdir;
use trellisdb::{
    CollectionId, CollectionSpec, Config, DenseIndexConfig, DistanceMetric, HnswParams,
    QuantizationMode, QuantizedKind, SparseEntry, SparseIndexConfig, SparseQuantization,
    TfIdfIndexConfig, TrellisDb, UserId, VectorId, VectorRecord, ROOT_USERNAME,
};

fn open_db(path: &std::path::Path) -> (TrellisDb, UserId) {
    let db = TrellisDb::open(path, Config::default()).unwrap();
    let root = db.user_id(ROOT_USERNAME).expect("root is seeded");
    (db, root)
}

fn commit_one(db: &TrellisDb, root: UserId, collection: CollectionId, record: VectorRecord) {
    let txn = db.create_transaction(root, collection).unwrap();
    db.stage_create(root, collection, txn, record).unwrap();
    db.commit_transaction(root, collection, txn).unwrap();
}

// ============================================================================
// Dense search
// ============================================================================

#[test]
fn test_dense_search_orders_by_similarity() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(2, DistanceMetric::Euclidean))
        .unwrap();

    commit_one(&db, root, docs.id, VectorRecord::dense(VectorId(1), vec![0.0, 0.0]));
    commit_one(&db, root, docs.id, VectorRecord::dense(VectorId(2), vec![1.0, 0.0]));
    commit_one(&db, root, docs.id, VectorRecord::dense(VectorId(3), vec![5.0, 5.0]));

    let hits = db.search_dense(root, docs.id, &[0.1, 0.0], 3).unwrap();
    let ids: Vec<u64> = hits.iter().map(|h| h.id.0).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > hits[2].score);

    db.close().unwrap();
}

#[test]
fn test_dense_search_never_returns_committed_deletes() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(2, DistanceMetric::Cosine))
        .unwrap();

    for id in 1..=10u64 {
        let angle = id as f32 * 0.3;
        commit_one(
            &db,
            root,
            docs.id,
            VectorRecord::dense(VectorId(id), vec![angle.cos(), angle.sin()]),
        );
    }
    let txn = db.create_transaction(root, docs.id).unwrap();
    db.stage_delete(root, docs.id, txn, VectorId(4)).unwrap();
    db.commit_transaction(root, docs.id, txn).unwrap();

    let query = [(4.0f32 * 0.3).cos(), (4.0f32 * 0.3).sin()];
    let hits = db.search_dense(root, docs.id, &query, 10).unwrap();
    assert!(hits.iter().all(|h| h.id != VectorId(4)));
    assert_eq!(hits.len(), 9);

    db.close().unwrap();
}

#[test]
fn test_dense_query_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(3, DistanceMetric::Cosine))
        .unwrap();

    let err = db.search_dense(root, docs.id, &[0.1, 0.2], 1).unwrap_err();
    assert!(err.is_schema());

    db.close().unwrap();
}

#[test]
fn test_search_without_index_is_invalid_state() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let bare = db
        .create_collection(root, CollectionSpec::named("bare"))
        .unwrap();

    assert!(db
        .search_dense(root, bare.id, &[0.1], 1)
        .unwrap_err()
        .is_invalid_state());
    assert!(db
        .search_sparse(root, bare.id, &[SparseEntry(0, 1.0)], 1, None)
        .unwrap_err()
        .is_invalid_state());
    assert!(db
        .search_text(root, bare.id, "hello", 1)
        .unwrap_err()
        .is_invalid_state());

    db.close().unwrap();
}

#[test]
fn test_dense_search_with_scalar_quantization() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    let config = DenseIndexConfig {
        quantization: QuantizationMode::Scalar {
            kind: QuantizedKind::U8,
            range: (-1.0, 1.0),
        },
        params: HnswParams {
            cache_size: 16,
            ..Default::default()
        },
        ..DenseIndexConfig::new(2, DistanceMetric::Cosine)
    };
    db.create_dense_index(root, docs.id, config).unwrap();

    for id in 1..=20u64 {
        let angle = id as f32 * 0.25;
        commit_one(
            &db,
            root,
            docs.id,
            VectorRecord::dense(VectorId(id), vec![angle.cos(), angle.sin()]),
        );
    }

    let query = [(7.0f32 * 0.25).cos(), (7.0f32 * 0.25).sin()];
    let hits = db.search_dense(root, docs.id, &query, 3).unwrap();
    assert_eq!(hits[0].id, VectorId(7));

    db.close().unwrap();
}

// ============================================================================
// Sparse search
// ============================================================================

#[test]
fn test_sparse_search_with_early_termination() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_sparse_index(
        root,
        docs.id,
        SparseIndexConfig {
            quantization: SparseQuantization::B128,
        },
    )
    .unwrap();

    commit_one(
        &db,
        root,
        docs.id,
        VectorRecord::sparse(VectorId(1), vec![SparseEntry(0, 0.9), SparseEntry(1, 0.5)]),
    );
    commit_one(
        &db,
        root,
        docs.id,
        VectorRecord::sparse(VectorId(2), vec![SparseEntry(1, 0.9)]),
    );

    let query = [SparseEntry(0, 1.0), SparseEntry(1, 0.2)];
    let exact = db.search_sparse(root, docs.id, &query, 2, None).unwrap();
    assert_eq!(exact[0].id, VectorId(1));

    // A loose threshold may skip weak lists but must keep the leader.
    let approx = db.search_sparse(root, docs.id, &query, 1, Some(0.5)).unwrap();
    assert_eq!(approx[0].id, VectorId(1));

    db.close().unwrap();
}

#[test]
fn test_sparse_malformed_query_rejected() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_sparse_index(root, docs.id, SparseIndexConfig::default())
        .unwrap();

    let err = db
        .search_sparse(
            root,
            docs.id,
            &[SparseEntry(3, 0.5), SparseEntry(3, 0.6)],
            1,
            None,
        )
        .unwrap_err();
    assert!(err.is_schema());

    db.close().unwrap();
}

// ============================================================================
// Text search
// ============================================================================

#[test]
fn test_text_search_ranks_by_tfidf_cosine() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_tfidf_index(root, docs.id, TfIdfIndexConfig::default())
        .unwrap();

    commit_one(
        &db,
        root,
        docs.id,
        VectorRecord::text(VectorId(1), "graph traversal over layered neighborhoods"),
    );
    commit_one(
        &db,
        root,
        docs.id,
        VectorRecord::text(VectorId(2), "posting lists and inverted files"),
    );

    let hits = db.search_text(root, docs.id, "layered graph", 2).unwrap();
    assert_eq!(hits[0].id, VectorId(1));
    assert!(hits.iter().all(|h| h.id != VectorId(2)));

    db.close().unwrap();
}

#[test]
fn test_text_index_can_drop_raw_text() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_tfidf_index(
        root,
        docs.id,
        TfIdfIndexConfig {
            store_raw_text: false,
        },
    )
    .unwrap();

    commit_one(
        &db,
        root,
        docs.id,
        VectorRecord::text(VectorId(1), "searchable but not stored"),
    );

    // The text is searchable yet absent from the committed record.
    let hits = db.search_text(root, docs.id, "searchable", 1).unwrap();
    assert_eq!(hits[0].id, VectorId(1));
    let record = db.get_vector(root, docs.id, VectorId(1)).unwrap();
    assert!(record.text.is_none());

    db.close().unwrap();
}

// ============================================================================
// Multi-modal vectors
// ============================================================================

#[test]
fn test_multi_modal_vector_searchable_in_every_index() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));
    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(3, DistanceMetric::DotProduct))
        .unwrap();
    db.create_sparse_index(root, docs.id, SparseIndexConfig::default())
        .unwrap();
    db.create_tfidf_index(root, docs.id, TfIdfIndexConfig::default())
        .unwrap();

    let vector = VectorRecord {
        id: VectorId(5),
        dense: Some(vec![0.3, 0.6, 0.9]),
        sparse: Some(vec![SparseEntry(12, 0.7)]),
        text: Some("hybrid retrieval demo".into()),
    };
    commit_one(&db, root, docs.id, vector.clone());

    assert_eq!(
        db.search_dense(root, docs.id, &[0.3, 0.6, 0.9], 1).unwrap()[0].id,
        VectorId(5)
    );
    assert_eq!(
        db.search_sparse(root, docs.id, &[SparseEntry(12, 1.0)], 1, None).unwrap()[0].id,
        VectorId(5)
    );
    assert_eq!(
        db.search_text(root, docs.id, "hybrid retrieval", 1).unwrap()[0].id,
        VectorId(5)
    );
    assert_eq!(db.get_vector(root, docs.id, VectorId(5)).unwrap(), vector);

    db.close().unwrap();
}
