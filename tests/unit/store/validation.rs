//! Tests for store validation against the filesystem

#[cfg(test)]
mod tests {
    use crate::fixtures::{insert_raw, solid_tile};
    use std::path::Path;
    use tilemosaic::math::color::Rgb;
    use tilemosaic::store::database::{Namespace, TileStore};
    use tilemosaic::store::record::{ContentHash, TileRecord};
    use tilemosaic::store::validation::{
        RecordStatus, ValidationOptions, ValidationReport, check_record, validate_store,
    };

    fn record_for(path: &Path) -> TileRecord {
        let bytes = std::fs::read(path).unwrap_or_default();
        TileRecord {
            path: path.to_string_lossy().into_owned(),
            color: Rgb::new(1, 1, 1),
            hash: ContentHash::from_bytes(&bytes),
        }
    }

    fn encoded(record: &TileRecord) -> Vec<u8> {
        record
            .encode()
            .unwrap_or_else(|e| unreachable!("record should encode: {e}"))
    }

    const OPTIONS: ValidationOptions = ValidationOptions {
        workers: 3,
        check_hash: true,
        show_progress: false,
    };

    // Tests an untouched file is valid with and without hashing
    // Verified by comparing hashes of different files
    #[test]
    fn test_check_record_valid() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let path = solid_tile(dir.path(), "a.png", 8, [1, 2, 3]);
        let record = record_for(&path);

        let (status, bytes) = check_record(&record.path, &encoded(&record), true);
        assert_eq!(status, RecordStatus::Valid);
        assert!(bytes > 0);
        assert_eq!(
            check_record(&record.path, &encoded(&record), false).0,
            RecordStatus::Valid
        );
    }

    // Tests a rewritten file is stale only when hashes are checked
    // Verified by always skipping the hash comparison
    #[test]
    fn test_check_record_changed() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let path = solid_tile(dir.path(), "a.png", 8, [1, 2, 3]);
        let record = record_for(&path);
        solid_tile(dir.path(), "a.png", 8, [200, 2, 3]);

        let (status, _) = check_record(&record.path, &encoded(&record), true);
        assert_eq!(status, RecordStatus::Changed);
        assert!(status.is_stale());
        assert_eq!(
            check_record(&record.path, &encoded(&record), false).0,
            RecordStatus::Valid
        );
    }

    // Tests missing files and undecodable values are stale
    // Verified by treating NotFound like other stat errors
    #[test]
    fn test_check_record_missing_and_undecodable() {
        let record = TileRecord {
            path: "/nonexistent/tile.png".to_string(),
            color: Rgb::default(),
            hash: ContentHash::from_bytes(b""),
        };
        let (status, _) = check_record(&record.path, &encoded(&record), false);
        assert_eq!(status, RecordStatus::Missing);

        let (status, _) = check_record("/any.png", b"junk", true);
        assert_eq!(status, RecordStatus::Undecodable);

        assert!(!RecordStatus::Unreadable.is_stale());
        assert!(!RecordStatus::Valid.is_stale());
    }

    // Tests a path that exists but cannot be read is kept as unreadable
    // Verified by treating read errors as a changed hash
    #[test]
    fn test_check_record_unreadable() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let folder = dir.path().join("not-a-file.png");
        assert!(std::fs::create_dir(&folder).is_ok());
        let record = record_for(&folder);

        let (status, _) = check_record(&record.path, &encoded(&record), true);
        assert_eq!(status, RecordStatus::Unreadable);
        assert!(!status.is_stale());
    }

    // Tests a full pass keeps the record of a file it cannot read
    // Verified by adding unreadable records to the stale list
    #[test]
    fn test_validate_store_keeps_unreadable() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let database = dir.path().join("db.bin");
        let namespace = Namespace::new("default", 8);
        let folder = dir.path().join("not-a-file.png");
        assert!(std::fs::create_dir(&folder).is_ok());
        let record = record_for(&folder);

        let Ok(store) = TileStore::open(&database, &namespace) else {
            unreachable!("store should open");
        };
        assert!(store.put_batch(std::slice::from_ref(&record)).is_ok());

        let report = validate_store(&store, &OPTIONS);
        assert!(matches!(
            report,
            Ok(ref r) if r.total == 1 && r.unreadable == 1 && r.removed == 0 && r.kept() == 1
        ));
        assert!(matches!(store.contains(&record.path), Ok(true)));
    }

    // Tests a full pass deletes exactly the changed, missing and corrupt records
    // Verified by deleting only missing records
    #[test]
    fn test_validate_store_removes_stale() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let database = dir.path().join("db.bin");
        let namespace = Namespace::new("default", 8);

        let kept = solid_tile(dir.path(), "kept.png", 8, [10, 10, 10]);
        let changed = solid_tile(dir.path(), "changed.png", 8, [20, 20, 20]);
        let deleted = solid_tile(dir.path(), "deleted.png", 8, [30, 30, 30]);
        let records = [record_for(&kept), record_for(&changed), record_for(&deleted)];

        match TileStore::open(&database, &namespace) {
            Ok(store) => assert!(store.put_batch(&records).is_ok()),
            Err(e) => unreachable!("store should open: {e}"),
        }
        insert_raw(&database, &namespace.table_name(), "/corrupt.png", b"junk");

        solid_tile(dir.path(), "changed.png", 8, [21, 20, 20]);
        assert!(std::fs::remove_file(&deleted).is_ok());

        let Ok(store) = TileStore::open(&database, &namespace) else {
            unreachable!("store should reopen");
        };
        let report = validate_store(&store, &OPTIONS);
        assert!(matches!(
            report,
            Ok(ValidationReport {
                total: 4,
                valid: 1,
                unreadable: 0,
                undecodable: 1,
                missing: 1,
                changed: 1,
                removed: 3,
            })
        ));

        let keys = store.keys().unwrap_or_default();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&*kept.to_string_lossy()));
    }

    // Tests validating an empty namespace is a no-op
    // Verified by failing when no record was submitted
    #[test]
    fn test_validate_empty_store() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let Ok(store) = TileStore::open(&dir.path().join("db.bin"), &Namespace::new("x", 4)) else {
            unreachable!("store should open");
        };
        let report = validate_store(&store, &OPTIONS);
        assert!(matches!(report, Ok(ref r) if r.total == 0 && r.kept() == 0));
    }
}
