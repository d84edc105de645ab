use relay_core::types::{Config, SavedConfig};
use relay_core::{RelayCore, Submission};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::SystemTime;
use tempfile::TempDir;

fn open_core() -> (Arc<RelayCore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        base_path: temp_dir.path().to_path_buf(),
        saved: SavedConfig::default(),
    };
    (Arc::new(RelayCore::open(config).unwrap()), temp_dir)
}

/// Verify ten threads creating 100 records each receive 1000 distinct ids.
#[test]
fn test_concurrent_records_get_distinct_ids() {
    let (core, _temp) = open_core();
    let now = SystemTime::now();

    let handles: Vec<_> = (0..10)
        .map(|t| {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                (0..100)
                    .map(|i| {
                        let record = core
                            .new_text_record(&format!("thread {t} note {i}"), now)
                            .unwrap();
                        core.insert(&record).unwrap();
                        record.id().to_string()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: HashSet<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(ids.len(), 1000);
    assert_eq!(core.all_messages().unwrap().len(), 1000);
}

/// Verify two simultaneous submissions of the same text store a single record.
#[test]
fn test_concurrent_identical_text_stores_once() {
    let (core, _temp) = open_core();
    let barrier = Arc::new(Barrier::new(2));
    let now = SystemTime::now();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let core = Arc::clone(&core);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                core.submit_text("hello", now).unwrap()
            })
        })
        .collect();

    let submissions: Vec<Submission> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let stored = submissions
        .iter()
        .filter(|s| matches!(s, Submission::Stored { .. }))
        .count();
    assert_eq!(stored, 1);
    assert_eq!(submissions[0].record().id(), submissions[1].record().id());
    assert_eq!(core.all_messages().unwrap().len(), 1);
}

/// Verify concurrent uploads and deletions leave the ledger equal to the stored sizes.
#[test]
fn test_ledger_consistent_under_concurrent_writes() {
    let (core, _temp) = open_core();
    let now = SystemTime::now();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let core = Arc::clone(&core);
            thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("t{t}-{i}.bin");
                    let outcome = core
                        .upload_file(&name, name.repeat(i + 1).as_bytes(), now)
                        .unwrap();
                    if i % 3 == 0 {
                        core.delete(outcome.submission.record().id()).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let sum: u64 = core
        .all_messages()
        .unwrap()
        .iter()
        .map(|r| r.file_size())
        .sum();
    assert_eq!(core.usage().unwrap().used, sum);
    assert_eq!(core.recount().unwrap(), sum);
}
