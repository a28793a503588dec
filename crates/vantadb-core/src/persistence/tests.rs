//! Tests for snapshot persistence.

#![allow(clippy::cast_precision_loss)]

use super::{SnapshotReader, SnapshotWriter};
use crate::config::{DatabaseOptions, IndexConfig, QuantizerConfig};
use crate::db::Database;
use crate::distance::DistanceMetric;
use crate::error::Error;
use crate::record::Metadata;

use serde_json::json;
use tempfile::tempdir;

fn sample_db() -> (Database, Vec<String>) {
    let db = Database::new(DatabaseOptions {
        metric: DistanceMetric::Cosine,
        ..DatabaseOptions::default()
    })
    .unwrap();
    db.initialize().unwrap();

    let vectors: Vec<Vec<f32>> = (0..40)
        .map(|i| {
            let angle = i as f32 * 0.37;
            vec![angle.cos(), angle.sin(), (i as f32 * 0.05).tanh()]
        })
        .collect();
    let metadata = (0..40)
        .map(|i| {
            let mut m = Metadata::new();
            m.insert("n".to_string(), json!(i));
            Some(m)
        })
        .collect();
    let ids = db.insert(vectors, Some(metadata)).unwrap();
    db.delete(&ids[5..8].to_vec()).unwrap();
    (db, ids)
}

#[test]
fn test_round_trip_preserves_stats_and_results() {
    let (db, _ids) = sample_db();
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.vnts");

    SnapshotWriter::write(&db, &path).unwrap();
    let restored = SnapshotReader::restore(&path).unwrap();

    let source_stats = db.get_stats().unwrap();
    let restored_stats = restored.get_stats().unwrap();
    assert_eq!(restored_stats.dimensions, source_stats.dimensions);
    assert_eq!(restored_stats.vector_count, source_stats.vector_count);
    assert_eq!(restored_stats.index.index_type, source_stats.index.index_type);
    assert_eq!(restored_stats.index.metric, source_stats.index.metric);
    assert_eq!(restored_stats.index.m, source_stats.index.m);

    for query in [&[1.0, 0.0, 0.0][..], &[0.2, -0.8, 0.5][..]] {
        let a = db.search(query, 5).unwrap();
        let b = restored.search(query, 5).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn test_restore_without_graph_section_rebuilds() {
    let db = Database::new(DatabaseOptions {
        index: IndexConfig::Flat,
        metric: DistanceMetric::Euclidean,
        ..DatabaseOptions::default()
    })
    .unwrap();
    db.initialize().unwrap();
    let ids = db
        .insert(vec![vec![0.0, 0.0], vec![5.0, 5.0]], None)
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("flat.vnts");
    SnapshotWriter::write(&db, &path).unwrap();

    let restored = SnapshotReader::restore(&path).unwrap();
    assert_eq!(restored.get_stats().unwrap().index.index_type, "FlatIndex");
    let results = restored.search(&[0.1, 0.1], 1).unwrap();
    assert_eq!(results[0].id, ids[0]);
}

#[test]
fn test_quantizer_state_survives_snapshot() {
    let db = Database::new(DatabaseOptions {
        quantizer: Some(QuantizerConfig::Scalar { bits: 8 }),
        metric: DistanceMetric::Euclidean,
        ..DatabaseOptions::default()
    })
    .unwrap();
    db.initialize().unwrap();
    let samples: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32 * 0.1, -(i as f32)]).collect();
    db.train_quantizer(&samples).unwrap();
    db.insert(samples[..5].to_vec(), None).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("quant.vnts");
    SnapshotWriter::write(&db, &path).unwrap();

    let restored = SnapshotReader::restore(&path).unwrap();
    let qstats = restored.get_stats().unwrap().quantization.unwrap();
    assert!(qstats.trained);
    assert_eq!(qstats.bits, Some(8));
    // Trained state is live: inserts work without re-training.
    restored.insert(vec![vec![1.0, -10.0]], None).unwrap();
}

#[test]
fn test_corrupted_section_fails_integrity_check() {
    let (db, _ids) = sample_db();
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.vnts");
    SnapshotWriter::write(&db, &path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = SnapshotReader::restore(&path).unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert!(err.to_string().contains("integrity check failed"));
}

#[test]
fn test_version_mismatch_is_rejected() {
    let (db, _ids) = sample_db();
    let dir = tempdir().unwrap();
    let path = dir.path().join("version.vnts");
    SnapshotWriter::write(&db, &path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[4] = 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let err = SnapshotReader::restore(&path).unwrap_err();
    assert!(err.to_string().contains("incompatible version"));
}

#[test]
fn test_non_snapshot_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.vnts");
    std::fs::write(&path, b"definitely not a snapshot").unwrap();
    assert!(matches!(
        SnapshotReader::restore(&path),
        Err(Error::Persistence(_))
    ));
}
