//! Storage engine integration tests.
//!
//! End-to-end validation of the engine surface over real table files:
//! - Point operations on a fresh table
//! - Leaf splits and byte-wise scan ordering
//! - Inclusive range bounds
//! - Underflow repair through sibling merges
//! - Persistence across engine restarts
//! - Leaf-chain integrity and pin accounting after every scenario

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;
use sedge_common::page::PageLevel;
use sedge_common::{SedgeError, StorageConfig};
use sedge_storage::{SlottedPage, StorageEngine, Table, MERGE_THRESHOLD_PERCENT};
use tempfile::tempdir;

fn test_engine(dir: &tempfile::TempDir) -> StorageEngine {
    StorageEngine::new(StorageConfig {
        data_dir: dir.path().to_path_buf(),
        buffer_pool_frames: 32,
        fsync_enabled: false,
    })
}

fn collect_keys(engine: &mut StorageEngine, table: &str) -> Vec<Bytes> {
    engine
        .scan_table(table)
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect()
}

/// Descends to the leftmost leaf and returns every leaf page in chain order.
fn leaf_chain(table: &mut Table) -> Vec<SlottedPage> {
    let mut page_id = table.root_page();
    assert_ne!(page_id, 0, "tree is empty");

    loop {
        let page = table.read_page(page_id).unwrap();
        match page.page_level() {
            PageLevel::Leaf => break,
            PageLevel::Internal => page_id = page.header().leftmost_child,
            PageLevel::None => panic!("descent reached a non-tree page"),
        }
    }

    let mut chain = Vec::new();
    loop {
        let page = table.read_page(page_id).unwrap();
        let next = page.header().next_page_id;
        chain.push(page);
        if next == 0 {
            break;
        }
        page_id = next;
    }
    chain
}

/// Checks the doubly linked leaf list in both directions and returns the
/// keys seen in forward order.
fn check_leaf_chain(table: &mut Table) -> Vec<Vec<u8>> {
    let chain = leaf_chain(table);

    // Forward: prev pointers must mirror the walk, keys strictly ascend.
    let mut keys: Vec<Vec<u8>> = Vec::new();
    let mut prev_id = 0;
    for page in &chain {
        let header = page.header();
        assert_eq!(header.prev_page_id, prev_id, "broken prev link");
        for i in 0..header.cell_count {
            keys.push(page.slot_key(i).unwrap().to_vec());
        }
        prev_id = header.page_id;
    }

    let mut sorted = keys.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(keys, sorted, "leaf chain keys out of order or duplicated");

    // Backward: next pointers must mirror the reverse walk.
    let mut next_id = 0;
    for page in chain.iter().rev() {
        let header = page.header();
        assert_eq!(header.next_page_id, next_id, "broken next link");
        next_id = header.page_id;
    }

    keys
}

#[test]
fn test_point_ops_on_empty_table() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);

    engine.create_table("t").unwrap();

    assert!(matches!(
        engine.get("t", b"k"),
        Err(SedgeError::KeyNotFound)
    ));

    engine.insert("t", b"k", b"v").unwrap();
    assert_eq!(engine.get("t", b"k").unwrap(), Bytes::from_static(b"v"));

    engine.update("t", b"k", b"w").unwrap();
    assert_eq!(engine.get("t", b"k").unwrap(), Bytes::from_static(b"w"));

    engine.delete("t", b"k").unwrap();
    assert!(matches!(
        engine.get("t", b"k"),
        Err(SedgeError::KeyNotFound)
    ));

    assert_eq!(engine.open_table("t").unwrap().pool().pinned_count(), 0);
}

#[test]
fn test_insert_errors() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    assert!(matches!(
        engine.insert("t", b"", b"v"),
        Err(SedgeError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.insert("t", b"k", b""),
        Err(SedgeError::InvalidArgument(_))
    ));

    let oversized = vec![0u8; 4000];
    assert!(matches!(
        engine.insert("t", b"k", &oversized),
        Err(SedgeError::InvalidArgument(_))
    ));

    engine.insert("t", b"k", b"v1").unwrap();
    assert!(matches!(
        engine.insert("t", b"k", b"v2"),
        Err(SedgeError::DuplicateKey)
    ));
    // The stored value is untouched by the rejected insert.
    assert_eq!(engine.get("t", b"k").unwrap(), Bytes::from_static(b"v1"));
}

#[test]
fn test_scan_returns_bytewise_key_order() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    for i in 0..20 {
        let key = format!("key{}", i);
        let value = format!("value{}", i);
        engine.insert("t", key.as_bytes(), value.as_bytes()).unwrap();
    }

    for i in 0..20 {
        let key = format!("key{}", i);
        let value = engine.get("t", key.as_bytes()).unwrap();
        assert_eq!(value, format!("value{}", i).as_bytes());
    }

    // Byte-wise order interleaves "key10".."key19" between "key1" and "key2".
    let expected: Vec<Bytes> = vec![
        "key0", "key1", "key10", "key11", "key12", "key13", "key14", "key15", "key16", "key17",
        "key18", "key19", "key2", "key3", "key4", "key5", "key6", "key7", "key8", "key9",
    ]
    .into_iter()
    .map(|s| Bytes::copy_from_slice(s.as_bytes()))
    .collect();

    assert_eq!(collect_keys(&mut engine, "t"), expected);
    assert_eq!(engine.open_table("t").unwrap().pool().pinned_count(), 0);
}

#[test]
fn test_range_scan_inclusive_bounds() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    for i in 0..10 {
        let key = format!("key{}", i);
        engine.insert("t", key.as_bytes(), b"v").unwrap();
    }

    let hits: Vec<Bytes> = engine
        .range_scan("t", Some(b"key2"), Some(b"key7"))
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();

    let expected: Vec<Bytes> = (2..=7)
        .map(|i| Bytes::copy_from_slice(format!("key{}", i).as_bytes()))
        .collect();
    assert_eq!(hits, expected);

    // A start bound below every key behaves like an unbounded start.
    let all: Vec<Bytes> = engine
        .range_scan("t", Some(b"a"), None)
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(all.len(), 10);

    // A start bound above every key yields nothing.
    let none: Vec<Bytes> = engine
        .range_scan("t", Some(b"zzz"), None)
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert!(none.is_empty());

    // Bounds that exclude everything in the middle yield nothing.
    let empty: Vec<Bytes> = engine
        .range_scan("t", Some(b"key20"), Some(b"key29"))
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert!(empty.is_empty());
}

#[test]
fn test_scan_on_empty_table() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    assert_eq!(engine.scan_table("t").unwrap().count(), 0);
}

#[test]
fn test_underflow_merges_respect_threshold() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    // 100-byte values force a multi-level tree at 200 keys.
    let value = [0x5Au8; 100];
    for i in 0..200 {
        let key = format!("key{:03}", i);
        engine.insert("t", key.as_bytes(), &value).unwrap();
    }

    for i in (0..200).step_by(2) {
        let key = format!("key{:03}", i);
        engine.delete("t", key.as_bytes()).unwrap();
    }

    // Every odd key survives with its value.
    for i in (1..200).step_by(2) {
        let key = format!("key{:03}", i);
        assert_eq!(engine.get("t", key.as_bytes()).unwrap(), &value[..]);
    }
    for i in (0..200).step_by(2) {
        let key = format!("key{:03}", i);
        assert!(engine.get("t", key.as_bytes()).is_err());
    }

    // The delete path merges an underutilised leaf whenever the union
    // fits, so no two adjacent leaves may end up both below the threshold
    // while a merge between them would still fit one page.
    let table = engine.open_table("t").unwrap();
    let chain = leaf_chain(table);
    for window in chain.windows(2) {
        let (left, right) = (&window[0], &window[1]);
        let both_under = left.is_underutilized() && right.is_underutilized();
        let union_fits = merged_size(left, right) <= sedge_common::page::PAGE_SIZE;
        assert!(
            !(both_under && union_fits),
            "pages {} and {} stayed under {}% despite a possible merge",
            left.page_id(),
            right.page_id(),
            MERGE_THRESHOLD_PERCENT
        );
    }

    let keys = check_leaf_chain(table);
    assert_eq!(keys.len(), 100);
    assert_eq!(table.pool().pinned_count(), 0);
}

fn merged_size(left: &SlottedPage, right: &SlottedPage) -> usize {
    sedge_common::page::PageHeader::SIZE
        + left.live_record_bytes()
        + right.live_record_bytes()
        + (left.cell_count() as usize + right.cell_count() as usize) * sedge_storage::SLOT_SIZE
}

#[test]
fn test_delete_down_to_empty_resets_tree() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    for i in 0..50 {
        let key = format!("key{:02}", i);
        engine.insert("t", key.as_bytes(), b"payload").unwrap();
    }
    for i in 0..50 {
        let key = format!("key{:02}", i);
        engine.delete("t", key.as_bytes()).unwrap();
    }

    assert_eq!(engine.scan_table("t").unwrap().count(), 0);
    assert_eq!(engine.open_table("t").unwrap().root_page(), 0);

    // The tree regrows from scratch.
    engine.insert("t", b"again", b"works").unwrap();
    assert_eq!(engine.get("t", b"again").unwrap(), Bytes::from_static(b"works"));
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempdir().unwrap();

    {
        let mut engine = test_engine(&dir);
        engine.create_table("t").unwrap();
        for i in 0..50 {
            let key = format!("key{:02}", i);
            let value = format!("value{:02}", i);
            engine.insert("t", key.as_bytes(), value.as_bytes()).unwrap();
        }
        engine.delete("t", b"key07").unwrap();
        // Engine drop flushes every open table.
    }

    let mut engine = test_engine(&dir);
    let records: Vec<(Bytes, Bytes)> = engine
        .scan_table("t")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 49);
    for (key, value) in &records {
        let expected = format!("value{}", &String::from_utf8_lossy(&key[3..]));
        assert_eq!(value, expected.as_bytes());
    }
    assert!(matches!(
        engine.get("t", b"key07"),
        Err(SedgeError::KeyNotFound)
    ));
    assert_eq!(engine.get("t", b"key08").unwrap(), Bytes::from_static(b"value08"));
}

#[test]
fn test_update_changes_value_length() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    engine.insert("t", b"k", b"short").unwrap();

    // Same length: in-place replacement.
    engine.update("t", b"k", b"shirt").unwrap();
    assert_eq!(engine.get("t", b"k").unwrap(), Bytes::from_static(b"shirt"));

    // Different length: delete-then-insert.
    engine.update("t", b"k", b"a much longer value").unwrap();
    assert_eq!(
        engine.get("t", b"k").unwrap(),
        Bytes::from_static(b"a much longer value")
    );

    assert!(matches!(
        engine.update("t", b"missing", b"v"),
        Err(SedgeError::KeyNotFound)
    ));
}

#[test]
fn test_drop_table_removes_file() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);

    engine.create_table("t").unwrap();
    engine.insert("t", b"k", b"v").unwrap();

    let path = engine.config().table_path("t");
    assert!(path.exists());

    engine.drop_table("t").unwrap();
    assert!(!path.exists());
    assert!(!engine.is_open("t"));

    assert!(matches!(
        engine.drop_table("t"),
        Err(SedgeError::TableNotFound(_))
    ));

    // The name is reusable immediately.
    engine.create_table("t").unwrap();
    assert_eq!(engine.scan_table("t").unwrap().count(), 0);
}

#[test]
fn test_close_table_flushes() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);

    engine.create_table("t").unwrap();
    engine.insert("t", b"k", b"v").unwrap();

    assert!(engine.close_table("t"));
    assert!(!engine.close_table("t"));

    assert_eq!(engine.get("t", b"k").unwrap(), Bytes::from_static(b"v"));
}

#[test]
fn test_randomized_round_trip() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);
    engine.create_table("t").unwrap();

    let mut rng = rand::thread_rng();
    let mut keys: Vec<String> = (0..300).map(|i| format!("key-{:04}-{}", i, rng.gen::<u16>())).collect();
    keys.sort();
    keys.dedup();
    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rng);

    for key in &shuffled {
        let value = format!("value-of-{}", key);
        engine.insert("t", key.as_bytes(), value.as_bytes()).unwrap();
    }

    for key in &keys {
        let value = engine.get("t", key.as_bytes()).unwrap();
        assert_eq!(value, format!("value-of-{}", key).as_bytes());
    }

    // Scan order matches the sorted key set.
    let scanned = collect_keys(&mut engine, "t");
    let expected: Vec<Bytes> = keys
        .iter()
        .map(|k| Bytes::copy_from_slice(k.as_bytes()))
        .collect();
    assert_eq!(scanned, expected);

    // Delete a random half; the rest keep their values.
    let (deleted, kept) = shuffled.split_at(shuffled.len() / 2);
    for key in deleted {
        engine.delete("t", key.as_bytes()).unwrap();
    }
    for key in deleted {
        assert!(engine.get("t", key.as_bytes()).is_err());
    }
    for key in kept {
        let value = engine.get("t", key.as_bytes()).unwrap();
        assert_eq!(value, format!("value-of-{}", key).as_bytes());
    }

    let table = engine.open_table("t").unwrap();
    check_leaf_chain(table);
    assert_eq!(table.pool().pinned_count(), 0);
}

#[test]
fn test_no_pins_leak_and_flush_idempotent() {
    let dir = tempdir().unwrap();
    let mut engine = test_engine(&dir);

    engine.create_table("t").unwrap();
    for i in 0..100 {
        let key = format!("key{:03}", i);
        engine.insert("t", key.as_bytes(), &[1u8; 64]).unwrap();
    }
    for i in (0..100).step_by(3) {
        let key = format!("key{:03}", i);
        engine.delete("t", key.as_bytes()).unwrap();
    }
    engine.update("t", b"key001", &[2u8; 64]).unwrap();
    let _ = engine.scan_table("t").unwrap().count();
    let _ = engine
        .range_scan("t", Some(b"key010"), Some(b"key050"))
        .unwrap()
        .count();

    let table = engine.open_table("t").unwrap();
    assert_eq!(table.pool().pinned_count(), 0);

    let first = engine.flush_all();
    let second = engine.flush_all();
    assert!(first > 0);
    assert_eq!(second, 0);
}
