use std::io::ErrorKind;

use lq::store::{KeyFactory, RecordName, RecordStore};

#[test]
fn test_claim_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let name = RecordName::from_parts(1000, 42);

    let _first = store.claim(&name).unwrap();
    let second = store.claim(&name);
    assert_eq!(second.unwrap_err().kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_hidden_records_are_invisible_until_published() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let name = RecordName::from_parts(1000, 42);

    let _file = store.claim(&name).unwrap();
    assert!(store.list().unwrap().is_empty());

    store.publish(&name).unwrap();
    assert_eq!(store.list().unwrap(), vec![name]);
}

#[test]
fn test_list_is_sorted_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();

    // Claimed and published out of key order on purpose.
    for millis in [3000u64, 1000, 2000] {
        let name = RecordName::from_parts(millis, 1);
        store.claim(&name).unwrap();
        store.publish(&name).unwrap();
    }

    let listed = store.list().unwrap();
    assert_eq!(
        listed,
        vec![
            RecordName::from_parts(1000, 1),
            RecordName::from_parts(2000, 1),
            RecordName::from_parts(3000, 1),
        ]
    );
}

#[test]
fn test_list_ignores_foreign_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    std::fs::write(dir.path().join("README"), b"not a record").unwrap();
    std::fs::write(dir.path().join(".stray"), b"not a record").unwrap();

    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_relocate_moves_record_out_of_store() {
    let dir = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();

    let name = RecordName::from_parts(1000, 7);
    store.claim(&name).unwrap();
    store.publish(&name).unwrap();

    let dest_dir = dest.path().join("done");
    store.relocate(&name, &dest_dir).unwrap();
    assert!(store.list().unwrap().is_empty());
    assert!(dest_dir.join(name.as_str()).exists());
}

#[test]
fn test_open_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("queue").join("sub");
    let store = RecordStore::open(&nested).unwrap();
    assert!(nested.is_dir());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_keys_from_distinct_processes_cannot_collide() {
    // Same millisecond, different pid suffix: distinct and both orderable.
    let a = RecordName::from_parts(5000, 100);
    let b = RecordName::from_parts(5000, 200);
    assert_ne!(a, b);
    assert!(a < b || b < a);
}

#[test]
fn test_key_factory_monotonic_against_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();

    let mut factory = KeyFactory::new();
    for _ in 0..50 {
        let name = factory.next();
        store.claim(&name).unwrap();
        store.publish(&name).unwrap();
    }

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 50);
    assert!(listed.windows(2).all(|w| w[0] < w[1]));
}
