//! Tests for storage backends.

use super::*;
use crate::error::Error;
use crate::record::Metadata;
use serde_json::json;
use tempfile::tempdir;

fn meta(label: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("label".to_string(), json!(label));
    m
}

fn populate(storage: &mut dyn VectorStorage, count: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let v = vec![i as f32, 1.0, -1.0];
        let id = format!("vec-{i:03}");
        storage.store(&id, &v, Some(&meta(&id))).unwrap();
        ids.push(id);
    }
    ids
}

fn backends() -> Vec<(Storage, Option<tempfile::TempDir>)> {
    let dir = tempdir().unwrap();
    let disk = DiskStorage::open(dir.path(), 4).unwrap();
    vec![
        (Storage::Memory(MemoryStorage::new()), None),
        (Storage::Disk(disk), Some(dir)),
    ]
}

#[test]
fn test_store_retrieve_round_trip() {
    for (mut storage, _guard) in backends() {
        storage
            .store("a", &[1.0, 2.0, 3.0], Some(&meta("a")))
            .unwrap();
        let (vector, metadata) = storage.retrieve("a").unwrap().unwrap();
        assert_eq!(vector, vec![1.0, 2.0, 3.0]);
        assert_eq!(metadata.unwrap().get("label"), Some(&json!("a")));
        assert!(storage.retrieve("missing").unwrap().is_none());
    }
}

#[test]
fn test_store_overwrites_existing() {
    for (mut storage, _guard) in backends() {
        storage.store("a", &[1.0, 0.0, 0.0], None).unwrap();
        storage
            .store("a", &[0.0, 1.0, 0.0], Some(&meta("updated")))
            .unwrap();
        assert_eq!(storage.len(), 1);
        let (vector, metadata) = storage.retrieve("a").unwrap().unwrap();
        assert_eq!(vector, vec![0.0, 1.0, 0.0]);
        assert_eq!(metadata.unwrap().get("label"), Some(&json!("updated")));
    }
}

#[test]
fn test_delete_tolerates_missing_ids() {
    for (mut storage, _guard) in backends() {
        populate(&mut storage, 3);
        let removed = storage
            .delete(&["vec-000".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.len(), 2);
        assert!(!storage.contains("vec-000"));
    }
}

#[test]
fn test_update_metadata_requires_existing_id() {
    for (mut storage, _guard) in backends() {
        populate(&mut storage, 1);
        storage.update_metadata("vec-000", meta("new")).unwrap();
        assert_eq!(
            storage.retrieve_metadata("vec-000").unwrap().unwrap(),
            meta("new")
        );
        assert!(matches!(
            storage.update_metadata("ghost", meta("x")),
            Err(Error::NotFound(_))
        ));
    }
}

#[test]
fn test_enumeration_completeness() {
    // Property: pages, the flat listing, and the stream agree.
    for (mut storage, _guard) in backends() {
        let ids = populate(&mut storage, 23);

        let listed = storage.list_ids(None);
        assert_eq!(listed.len(), ids.len());

        let mut paged = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = storage.list_ids_paged(5, cursor.as_deref()).unwrap();
            assert!(page.items.len() <= 5);
            paged.extend(page.items);
            if !page.has_more {
                assert!(page.next_cursor.is_none());
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(paged, listed);

        let streamed: Vec<String> = storage.stream_ids().collect();
        assert_eq!(streamed, listed);
    }
}

#[test]
fn test_paging_rejects_bad_inputs() {
    for (mut storage, _guard) in backends() {
        populate(&mut storage, 3);
        assert!(storage.list_ids_paged(0, None).is_err());
        assert!(storage.list_ids_paged(crate::MAX_PAGE + 1, None).is_err());
        assert!(storage.list_ids_paged(5, Some("not-a-cursor")).is_err());
    }
}

#[test]
fn test_list_ids_limit() {
    for (mut storage, _guard) in backends() {
        populate(&mut storage, 10);
        assert_eq!(storage.list_ids(Some(4)).len(), 4);
        assert_eq!(storage.list_ids(Some(100)).len(), 10);
    }
}

#[test]
fn test_memory_pagination_survives_concurrent_delete() {
    let mut storage = MemoryStorage::new();
    populate(&mut storage, 10);

    let first = storage.list_ids_paged(4, None).unwrap();
    // Delete an id that would have landed in a later page.
    storage.delete(&["vec-007".to_string()]).unwrap();
    let second = storage
        .list_ids_paged(4, first.next_cursor.as_deref())
        .unwrap();

    // The snapshot still enumerates the key order at pagination start.
    assert_eq!(first.items.len(), 4);
    assert!(second.items.contains(&"vec-007".to_string()));
}

#[test]
fn test_stats_shape() {
    for (mut storage, _guard) in backends() {
        assert_eq!(storage.stats().vector_count, 0);
        populate(&mut storage, 2);
        let stats = storage.stats();
        assert_eq!(stats.vector_count, 2);
        assert_eq!(stats.dimensions, Some(3));
        match &storage {
            Storage::Memory(_) => assert_eq!(stats.backend, "MemoryStorage"),
            Storage::Disk(_) => {
                assert_eq!(stats.backend, "DiskStorage");
                assert!(stats.disk_bytes.unwrap() > 0);
            }
        }
    }
}

#[test]
fn test_disk_recovery_after_flush() {
    let dir = tempdir().unwrap();
    {
        let mut storage = DiskStorage::open(dir.path(), 4).unwrap();
        populate(&mut storage, 5);
        storage.delete(&["vec-001".to_string()]).unwrap();
        storage.flush().unwrap();
    }

    let storage = DiskStorage::open(dir.path(), 4).unwrap();
    assert_eq!(storage.recovered_count(), 4);
    assert_eq!(storage.dimensions(), Some(3));
    let (vector, metadata) = storage.retrieve("vec-003").unwrap().unwrap();
    assert_eq!(vector, vec![3.0, 1.0, -1.0]);
    assert_eq!(metadata.unwrap(), meta("vec-003"));
    assert!(storage.retrieve("vec-001").unwrap().is_none());
}

#[test]
fn test_disk_recovery_from_wal_without_flush() {
    let dir = tempdir().unwrap();
    {
        let mut storage = DiskStorage::open(dir.path(), 4).unwrap();
        populate(&mut storage, 3);
        // Reach the WAL but skip the index write that flush() performs.
        std::mem::forget(storage);
    }
    // The BufWriter buffer was lost with the leaked storage, but small
    // writes may still be buffered; reopening must at least not corrupt.
    let storage = DiskStorage::open(dir.path(), 4).unwrap();
    assert!(storage.recovered_count() <= 3);
}

#[test]
fn test_disk_close_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut storage = DiskStorage::open(dir.path(), 4).unwrap();
    populate(&mut storage, 1);
    storage.close().unwrap();
    storage.close().unwrap();
    assert!(storage.store("late", &[1.0, 2.0, 3.0], None).is_err());
}
