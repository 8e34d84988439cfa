// Property-style checks over longer operation sequences: size accounting,
// the load-factor bound, and round-trip reopening.

use dht::{OpenFlags, Table, TableOptions};
use std::collections::HashMap;
use tempfile::tempdir;

const KEY_MAXLEN: u32 = 23;
const OBJECT_DATALEN: u32 = 8;

fn opts() -> TableOptions {
    TableOptions::new(KEY_MAXLEN, OBJECT_DATALEN)
}

fn payload_for(n: u32) -> [u8; OBJECT_DATALEN as usize] {
    let b = n.to_le_bytes();
    [b[0], b[1], b[2], b[3], b[0], b[1], b[2], b[3]]
}

/// Full scan of the store table, filtered by primary-bucket membership, must
/// agree with `size()`.
#[test]
fn size_matches_a_full_scan_of_live_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("scan.dht");
    let mut table = Table::open(&path, opts(), OpenFlags::create()).expect("create");

    let mut model: HashMap<String, [u8; OBJECT_DATALEN as usize]> = HashMap::new();
    for i in 0..200u32 {
        let key = format!("key-{i}");
        let p = payload_for(i);
        table.insert(&key, &p).expect("insert");
        model.insert(key, p);

        if i % 7 == 0 {
            if let Some((victim, _)) = model.iter().next().map(|(k, v)| (k.clone(), *v)) {
                table.delete(&victim).expect("delete");
                model.remove(&victim);
            }
        }
    }

    let mut scanned = 0u32;
    for idx in 0..table.cursor() {
        match table.indexed_lookup(idx) {
            Ok(_) => scanned += 1,
            Err(dht::DhtError::NoData) => continue,
            Err(e) => panic!("unexpected error during scan: {e}"),
        }
    }

    assert_eq!(scanned, table.size());
    assert_eq!(scanned as usize, model.len());
}

/// `slots_used` never exceeds 3/4 of capacity, at every observation point.
#[test]
fn slots_used_stays_within_the_load_factor_bound() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("load_factor.dht");
    let mut table = Table::open(&path, opts(), OpenFlags::create()).expect("create");

    for i in 0..500u32 {
        table
            .insert(&format!("k{i}"), &payload_for(i))
            .expect("insert");
        assert!(table.slots_used() <= 3 * table.capacity() / 4);
    }
}

/// A deleted key that is never reinserted is reported not-found; a key that
/// survives returns its most recently written payload.
#[test]
fn deleted_keys_miss_and_surviving_keys_return_latest_payload() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lifecycle.dht");
    let mut table = Table::open(&path, opts(), OpenFlags::create()).expect("create");

    table.insert("alive", &payload_for(1)).unwrap();
    table.insert("gone", &payload_for(2)).unwrap();
    table.update("alive", &payload_for(3)).unwrap();
    table.delete("gone").unwrap();

    assert_eq!(table.lookup("alive").unwrap().unwrap(), payload_for(3));
    assert!(table.lookup("gone").unwrap().is_none());
}

/// Reopening a freed table with no options (accept-whatever-is-on-disk)
/// reproduces every surviving lookup identically.
#[test]
fn round_trip_through_free_and_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("roundtrip.dht");

    let mut model: HashMap<String, [u8; OBJECT_DATALEN as usize]> = HashMap::new();
    {
        let mut table = Table::open(&path, opts(), OpenFlags::create()).expect("create");
        for i in 0..64u32 {
            let key = format!("rt-{i}");
            let p = payload_for(i);
            table.insert(&key, &p).unwrap();
            model.insert(key, p);
        }
        for i in (0..64u32).step_by(3) {
            let key = format!("rt-{i}");
            table.delete(&key).unwrap();
            model.remove(&key);
        }
        table.free().expect("free");
    }

    let reopened =
        Table::open(&path, TableOptions::any(), OpenFlags::read_only()).expect("reopen");
    for (key, payload) in &model {
        assert_eq!(reopened.lookup(key).unwrap().unwrap(), payload);
    }
    assert_eq!(reopened.size() as usize, model.len());
}

/// `insert` on a duplicate key is a no-op; only `update` changes the payload.
#[test]
fn insert_is_idempotent_on_duplicates() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("idempotent.dht");
    let mut table = Table::open(&path, opts(), OpenFlags::create()).expect("create");

    let original = payload_for(10);
    let attempted_overwrite = payload_for(99);

    assert!(table.insert("dup", &original).unwrap());
    assert!(!table.insert("dup", &attempted_overwrite).unwrap());
    assert_eq!(table.lookup("dup").unwrap().unwrap(), original);
}
