// Boundary scenarios for the on-disk hash table: exact acceptance checks
// against fixed inputs, one test per scenario, rather than a round-trip grid.

use dht::{DhtError, OpenFlags, Table, TableOptions};
use tempfile::tempdir;

fn payload(byte: u8) -> [u8; 8] {
    [byte; 8]
}

#[test]
fn fresh_table_starts_at_minimum_capacity() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("empty.dht");

    let table = Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");

    assert_eq!(table.capacity(), 8);
    assert_eq!(table.size(), 0);
}

#[test]
fn eighth_insert_triggers_rehash_to_sixteen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("grow.dht");
    let mut table =
        Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");

    let keys = ["a", "b", "c", "d", "e", "f", "g"];
    for (i, key) in keys.iter().enumerate() {
        assert!(table.insert(key, &payload(i as u8)).expect("insert"));
    }
    assert_eq!(table.size(), 7);
    assert_eq!(table.slots_used(), 7);

    assert!(table.insert("h", &payload(7)).expect("insert h"));
    assert_eq!(table.capacity(), 16);
    assert_eq!(table.size(), 8);

    for (i, key) in keys.iter().chain(["h"].iter()).enumerate() {
        let found = table.lookup(key).expect("lookup").expect("present");
        assert_eq!(found, payload(i as u8));
    }
}

#[test]
fn oversized_key_is_rejected_without_mutation() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("oversized.dht");
    let mut table =
        Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");

    let long_key = "x".repeat(16);
    let err = table
        .insert(&long_key, &payload(0))
        .expect_err("16-byte key must be rejected when key_maxlen=15");
    assert!(matches!(err, DhtError::InvalidArgument));
    assert_eq!(table.size(), 0);
}

#[test]
fn update_overwrites_but_insert_on_duplicate_does_not() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("update.dht");
    let mut table =
        Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");

    let p1 = payload(1);
    let p2 = payload(2);

    assert!(table.insert("k", &p1).expect("insert"));
    assert!(!table.insert("k", &p2).expect("duplicate insert"));
    assert_eq!(table.lookup("k").unwrap().unwrap(), p1);

    assert!(table.update("k", &p2).expect("update"));
    assert_eq!(table.lookup("k").unwrap().unwrap(), p2);

    assert!(!table.update("missing", &p2).expect("update miss"));
}

#[test]
fn delete_leaves_a_tombstone_and_a_gap_in_the_store_table() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("delete.dht");
    let mut table =
        Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");

    table.insert("a", &payload(0)).unwrap();
    table.insert("b", &payload(1)).unwrap();
    table.insert("c", &payload(2)).unwrap();

    assert!(table.delete("b").expect("delete"));

    assert_eq!(table.size(), 2);
    assert_eq!(table.dirty_slots(), 1);
    assert_eq!(table.slots_used(), 3);

    assert!(matches!(
        table.indexed_lookup(1),
        Err(DhtError::NoData)
    ));
    assert_eq!(table.indexed_lookup(0).unwrap().0, "a");
    assert_eq!(table.indexed_lookup(2).unwrap().0, "c");
}

#[test]
fn reopening_with_mismatched_options_is_rejected_and_leaves_file_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mismatch.dht");
    {
        let mut table =
            Table::open(&path, TableOptions::new(15, 8), OpenFlags::create()).expect("create");
        table.insert("k", &payload(9)).unwrap();
    }

    let before = std::fs::read(&path).expect("read file");

    let err = Table::open(&path, TableOptions::new(7, 0), OpenFlags::read_only())
        .expect_err("key_maxlen mismatch must be rejected");
    assert!(matches!(err, DhtError::Corruption(_)));

    let after = std::fs::read(&path).expect("read file again");
    assert_eq!(before, after, "a rejected open must not alter the file");
}
