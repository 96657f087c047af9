//! Integration tests for database lifecycle and collection management.
//!
//! These tests verify the end-to-end behavior of:
//! - Opening new databases and reopening existing ones
//! - Initial role/user seeding
//! - Collection creation, lookup, listing, and cascade deletion
//! - Index attachment rules

use tempfile::tempdir;
use trellisdb::{
    CollectionConfig, CollectionSpec, Config, DenseIndexConfig, DistanceMetric, SparseIndexConfig,
    TfIdfIndexConfig, TrellisDb, UserId, ROOT_USERNAME,
};

fn open_db(path: &std::path::Path) -> (TrellisDb, UserId) {
    let db = TrellisDb::open(path, Config::default()).unwrap();
    let root = db.user_id(ROOT_USERNAME).expect("root is seeded");
    (db, root)
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_open_creates_new_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    assert!(!path.exists(), "Database should not exist before open");

    let (db, _) = open_db(&path);
    assert!(path.exists(), "Database file should exist after open");

    db.close().unwrap();
}

#[test]
fn test_reopen_preserves_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let (db, _) = open_db(&path);
    let created = db.metadata().created_at;
    db.close().unwrap();

    let (db, _) = open_db(&path);
    assert_eq!(db.metadata().created_at, created);
    db.close().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempdir().unwrap();
    let config = Config {
        cache_size_mb: 0,
        ..Default::default()
    };
    let result = TrellisDb::open(dir.path().join("test.db"), config);
    assert!(result.is_err());
}

// ============================================================================
// Collection Tests
// ============================================================================

#[test]
fn test_create_and_get_collection() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let spec = CollectionSpec {
        description: Some("documentation vectors".into()),
        config: CollectionConfig {
            max_vector_count: Some(1000),
            replication_factor: Some(3),
        },
        ..CollectionSpec::named("docs")
    };
    let record = db.create_collection(root, spec).unwrap();
    assert_eq!(record.name, "docs");
    assert_eq!(record.config.max_vector_count, Some(1000));

    let fetched = db.get_collection(root, record.id).unwrap();
    assert_eq!(fetched, record);

    let by_name = db.find_collection(root, "docs").unwrap();
    assert_eq!(by_name.id, record.id);

    db.close().unwrap();
}

#[test]
fn test_collection_names_are_unique() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    db.create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    let err = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap_err();
    assert!(err.is_invalid_state());

    db.close().unwrap();
}

#[test]
fn test_empty_collection_name_rejected() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let err = db
        .create_collection(root, CollectionSpec::named("  "))
        .unwrap_err();
    assert!(err.is_schema());

    db.close().unwrap();
}

#[test]
fn test_list_collections() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    db.create_collection(root, CollectionSpec::named("alpha"))
        .unwrap();
    db.create_collection(root, CollectionSpec::named("beta"))
        .unwrap();

    let listed = db.list_collections(root).unwrap();
    let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    db.close().unwrap();
}

#[test]
fn test_unknown_collection_is_not_found() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let err = db
        .get_collection(root, trellisdb::CollectionId(99))
        .unwrap_err();
    // Root's database-wide role resolves, so the failure is the missing
    // collection, not a permission error.
    assert!(err.is_not_found());
    assert!(db.find_collection(root, "ghost").unwrap_err().is_not_found());

    db.close().unwrap();
}

#[test]
fn test_delete_collection_cascades() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let (db, root) = open_db(&path);

    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(2, DistanceMetric::Cosine))
        .unwrap();
    let txn = db.create_transaction(root, docs.id).unwrap();
    db.stage_create(
        root,
        docs.id,
        txn,
        trellisdb::VectorRecord::dense(trellisdb::VectorId(1), vec![0.5, 0.5]),
    )
    .unwrap();
    db.commit_transaction(root, docs.id, txn).unwrap();
    assert_eq!(db.vector_count(root, docs.id).unwrap(), 1);

    db.delete_collection(root, docs.id).unwrap();
    assert!(db.get_collection(root, docs.id).unwrap_err().is_not_found());
    assert!(db.list_collections(root).unwrap().is_empty());
    db.close().unwrap();

    // The cascade is durable.
    let (db, root) = open_db(&path);
    assert!(db.list_collections(root).unwrap().is_empty());
    db.close().unwrap();
}

#[test]
fn test_deleted_collection_name_can_be_reused() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let first = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.delete_collection(root, first.id).unwrap();
    let second = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    assert_ne!(first.id, second.id, "collection ids are never reused");

    db.close().unwrap();
}

// ============================================================================
// Index Attachment Tests
// ============================================================================

#[test]
fn test_attach_all_three_index_kinds() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(4, DistanceMetric::Euclidean))
        .unwrap();
    db.create_sparse_index(root, docs.id, SparseIndexConfig::default())
        .unwrap();
    db.create_tfidf_index(root, docs.id, TfIdfIndexConfig::default())
        .unwrap();

    let record = db.get_collection(root, docs.id).unwrap();
    assert!(record.dense_index.is_some());
    assert!(record.sparse_index.is_some());
    assert!(record.tfidf_index.is_some());
    assert_eq!(record.dense_index.unwrap().dimension, 4);

    db.close().unwrap();
}

#[test]
fn test_at_most_one_index_per_kind() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    db.create_dense_index(root, docs.id, DenseIndexConfig::new(4, DistanceMetric::Cosine))
        .unwrap();
    let err = db
        .create_dense_index(root, docs.id, DenseIndexConfig::new(8, DistanceMetric::Cosine))
        .unwrap_err();
    assert!(err.is_schema());

    db.close().unwrap();
}

#[test]
fn test_invalid_dense_index_config_rejected() {
    let dir = tempdir().unwrap();
    let (db, root) = open_db(&dir.path().join("test.db"));

    let docs = db
        .create_collection(root, CollectionSpec::named("docs"))
        .unwrap();
    let err = db
        .create_dense_index(root, docs.id, DenseIndexConfig::new(0, DistanceMetric::Cosine))
        .unwrap_err();
    assert!(err.is_schema());
    // Nothing was attached.
    assert!(db.get_collection(root, docs.id).unwrap().dense_index.is_none());

    db.close().unwrap();
}
