//! `JsonFileStore` persistence tests

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use paper_trail_app::adapters::JsonFileStore;
use paper_trail_core::traits::KeyValueStore;

#[test]
fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local-store.json");

    let store = JsonFileStore::open(&path).unwrap();
    store.set_item("paper-trail-sync-config", r#"{"enableSync":false}"#).unwrap();
    store.set_item("other", "1").unwrap();
    store.remove_item("other").unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(
        reopened.get_item("paper-trail-sync-config").unwrap().as_deref(),
        Some(r#"{"enableSync":false}"#)
    );
    assert_eq!(reopened.get_item("other").unwrap(), None);
}

#[test]
fn test_missing_parent_directory_is_created_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("local-store.json");

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.get_item("k").unwrap(), None);
    store.set_item("k", "v").unwrap();
    assert!(path.exists());
}

#[test]
fn test_corrupt_file_is_preserved_and_store_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local-store.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.get_item("k").unwrap(), None);
    store.set_item("k", "v").unwrap();
    assert_eq!(
        JsonFileStore::open(&path).unwrap().get_item("k").unwrap().as_deref(),
        Some("v")
    );

    let preserved: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|p| {
            p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("local-store.json.corrupt-")
        })
        .collect();
    assert_eq!(preserved.len(), 1, "{preserved:?}");
    assert_eq!(std::fs::read_to_string(&preserved[0]).unwrap(), "{ not json");
}

#[test]
fn test_non_string_values_are_preserved_too() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local-store.json");
    std::fs::write(&path, r#"{"k": 1}"#).unwrap();

    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.get_item("k").unwrap(), None);
    assert!(!path.exists());
}
