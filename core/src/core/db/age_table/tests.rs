use super::*;
use tempfile::tempdir;

mod common {
    use super::*;
    pub(super) use redb::ReadableDatabase;

    pub(super) const TEST_TABLE: AgeTable = AgeTable::new("test_age");

    pub(super) fn create_test_db() -> (redb::Database, tempfile::TempDir) {
        let temp = tempdir().unwrap();
        let db = redb::Database::create(temp.path().join("test.redb")).unwrap();
        (db, temp)
    }

    pub(super) fn make_age_key(id: &str, updated_at: SystemTime) -> AgeKey {
        AgeKey {
            updated_at,
            id: RecordId::try_new(id.to_string()).unwrap(),
        }
    }

    pub(super) fn seed(db: &redb::Database, keys: &[AgeKey]) {
        let write_txn = db.begin_write().unwrap();
        TEST_TABLE.init(&write_txn).unwrap();
        for key in keys {
            TEST_TABLE.insert(&write_txn, key).unwrap();
        }
        write_txn.commit().unwrap();
    }
}

mod init {
    use super::common::*;
    use super::*;

    #[test]
    fn test_init_creates_empty_table() {
        let (db, _temp) = create_test_db();
        seed(&db, &[]);

        let read_txn = db.begin_read().unwrap();
        let table = read_txn.open_table(TEST_TABLE.definition()).unwrap();
        assert!(ids_oldest_first(&table).unwrap().is_empty());
    }

    #[test]
    fn test_init_idempotent() {
        let (db, _temp) = create_test_db();
        seed(&db, &[]);
        seed(&db, &[]);
    }
}

mod ordering {
    use super::common::*;
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_iterates_oldest_first() {
        let (db, _temp) = create_test_db();
        let now = SystemTime::now();
        seed(
            &db,
            &[
                make_age_key("c", now),
                make_age_key("a", now + Duration::from_secs(20)),
                make_age_key("b", now - Duration::from_secs(20)),
            ],
        );

        let read_txn = db.begin_read().unwrap();
        let table = read_txn.open_table(TEST_TABLE.definition()).unwrap();
        let ids: Vec<String> = ids_oldest_first(&table)
            .unwrap()
            .into_iter()
            .map(Into::into)
            .collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn test_older_than_is_strict() {
        let (db, _temp) = create_test_db();
        let now = SystemTime::now();
        let cutoff = now - Duration::from_secs(60);
        seed(
            &db,
            &[
                make_age_key("old", cutoff - Duration::from_secs(1)),
                make_age_key("edge", cutoff),
                make_age_key("new", now),
            ],
        );

        let read_txn = db.begin_read().unwrap();
        let table = read_txn.open_table(TEST_TABLE.definition()).unwrap();
        let ids = ids_older_than(&table, cutoff).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "old");
    }
}

mod remove {
    use super::common::*;
    use super::*;

    #[test]
    fn test_remove_reports_presence() {
        let (db, _temp) = create_test_db();
        let now = SystemTime::now();
        let key = make_age_key("a", now);
        seed(&db, &[key.clone()]);

        let write_txn = db.begin_write().unwrap();
        assert!(TEST_TABLE.remove(&write_txn, &key).unwrap());
        assert!(!TEST_TABLE.remove(&write_txn, &key).unwrap());
        write_txn.commit().unwrap();
    }
}
