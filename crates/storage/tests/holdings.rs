#![forbid(unsafe_code)]

use ld_core::Document;
use ld_storage::{HOLDING_COLLECTION, Storage, StoreConfig, StoreError, StoreRequest, UpdateRequest};
use serde_json::json;
use std::path::PathBuf;

const BASE: &str = "https://id.example.org/";
const LIBRARY_S: &str = "https://libris.example.org/library/S";
const LIBRARY_T: &str = "https://libris.example.org/library/T";

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("ld_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn open(test_name: &str) -> Storage {
    Storage::open(&StoreConfig::new(temp_dir(test_name))).expect("open storage")
}

fn bib(id: &str) -> Document {
    Document::new(json!({"@graph": [
        {"@id": format!("{BASE}{id}"), "mainEntity": {"@id": format!("{BASE}{id}#it")}},
        {"@id": format!("{BASE}{id}#it"), "@type": "Instance"}
    ]}))
}

fn holding(id: &str, bib_id: &str, library: &str) -> Document {
    Document::new(json!({"@graph": [
        {"@id": format!("{BASE}{id}"), "mainEntity": {"@id": format!("{BASE}{id}#it")}},
        {
            "@id": format!("{BASE}{id}#it"),
            "@type": "Item",
            "itemOf": {"@id": format!("{BASE}{bib_id}#it")},
            "heldBy": {"@id": library}
        }
    ]}))
}

fn hold_request() -> StoreRequest {
    StoreRequest::new(HOLDING_COLLECTION, "test")
}

#[test]
fn one_live_holding_per_library_and_bib() {
    let storage = open("one_live_holding_per_library_and_bib");
    storage
        .store(&mut bib("b1"), &StoreRequest::new("bib", "test"))
        .expect("store bib");

    storage
        .store(&mut holding("h1", "b1", LIBRARY_S), &hold_request())
        .expect("first holding");
    let err = storage
        .store(&mut holding("h2", "b1", LIBRARY_S), &hold_request())
        .expect_err("second holding for the same library");
    match err {
        StoreError::ConflictingHold { bib, held_by } => {
            assert_eq!(bib, "b1");
            assert_eq!(held_by, LIBRARY_S);
        }
        other => panic!("unexpected error: {other}"),
    }
    storage
        .store(&mut holding("h3", "b1", LIBRARY_T), &hold_request())
        .expect("other library");

    assert_eq!(
        storage
            .get_holding_for_bib_and_sigel(&format!("{BASE}b1#it"), LIBRARY_S)
            .expect("lookup"),
        Some("h1".to_string())
    );
    assert_eq!(
        storage
            .get_dependers_of_type("b1", "itemOf")
            .expect("dependers"),
        vec!["h1".to_string(), "h3".to_string()]
    );
}

#[test]
fn concurrent_holdings_admit_exactly_one() {
    let storage = open("concurrent_holdings_admit_exactly_one");
    storage
        .store(&mut bib("b1"), &StoreRequest::new("bib", "test"))
        .expect("store bib");

    let results: Vec<Result<(), StoreError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let storage = &storage;
                scope.spawn(move || {
                    storage.store(&mut holding(&format!("h{n}"), "b1", LIBRARY_S), &hold_request())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("writer thread"))
            .collect()
    });

    let stored = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(StoreError::ConflictingHold { .. })))
        .count();
    assert_eq!(stored, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(storage.get_dependers_of_type("b1", "itemOf").expect("dependers").len(), 1);
    assert_eq!(storage.pool_metrics().outstanding, 0);
}

#[test]
fn missing_holding_target_is_reported() {
    let storage = open("missing_holding_target_is_reported");

    let err = storage
        .store(&mut holding("h1", "ghost", LIBRARY_S), &hold_request())
        .expect_err("no such bib");
    match err {
        StoreError::HoldingTargetNotFound { iri } => assert_eq!(iri, format!("{BASE}ghost#it")),
        other => panic!("unexpected error: {other}"),
    }

    let created = storage
        .create_document(&mut holding("h1", "ghost", LIBRARY_S), &hold_request())
        .expect("create_document");
    assert!(!created);
    assert!(storage.load("h1").expect("load").is_none());

    let mut no_target = bib("h2");
    no_target.set_held_by(LIBRARY_S);
    let err = storage
        .create_document(&mut no_target, &hold_request())
        .expect_err("holding without itemOf");
    assert_eq!(err.code(), "INVALID_INPUT");

    storage
        .store(&mut bib("b1"), &StoreRequest::new("bib", "test"))
        .expect("store bib");
    assert!(
        storage
            .create_document(&mut holding("h1", "b1", LIBRARY_S), &hold_request())
            .expect("create_document")
    );
}

#[test]
fn removed_holdings_free_the_slot() {
    let storage = open("removed_holdings_free_the_slot");
    storage
        .store(&mut bib("b1"), &StoreRequest::new("bib", "test"))
        .expect("store bib");
    storage
        .store(&mut holding("h1", "b1", LIBRARY_S), &hold_request())
        .expect("first holding");

    storage
        .remove("h1", &UpdateRequest::new("test"))
        .expect("remove holding");
    storage
        .store(&mut holding("h2", "b1", LIBRARY_S), &hold_request())
        .expect("replacement holding");
    assert_eq!(
        storage
            .get_holding_for_bib_and_sigel(&format!("{BASE}b1#it"), LIBRARY_S)
            .expect("lookup"),
        Some("h2".to_string())
    );

    let err = storage
        .store_atomic_update("h1", &UpdateRequest::new("test"), |doc| {
            doc.set_deleted(false);
            Ok::<(), String>(())
        })
        .expect_err("restoring a superseded holding");
    assert_eq!(err.code(), "CONFLICTING_HOLD");
}

#[test]
fn moving_a_holding_rechecks_the_target() {
    let storage = open("moving_a_holding_rechecks_the_target");
    let bib_request = StoreRequest::new("bib", "test");
    storage.store(&mut bib("b1"), &bib_request).expect("store b1");
    storage.store(&mut bib("b2"), &bib_request).expect("store b2");
    storage
        .store(&mut holding("h1", "b1", LIBRARY_S), &hold_request())
        .expect("holding on b1");
    storage
        .store(&mut holding("h2", "b2", LIBRARY_S), &hold_request())
        .expect("holding on b2");

    let err = storage
        .store_atomic_update("h2", &UpdateRequest::new("test"), |doc| {
            doc.set_holding_for(&format!("{BASE}b1#it"));
            Ok::<(), String>(())
        })
        .expect_err("move onto an occupied bib");
    assert_eq!(err.code(), "CONFLICTING_HOLD");

    let moved = storage
        .store_atomic_update("h2", &UpdateRequest::new("test"), |doc| {
            doc.set_held_by(LIBRARY_T);
            doc.set_holding_for(&format!("{BASE}b1#it"));
            Ok::<(), String>(())
        })
        .expect("move with a new owner");
    assert_eq!(moved.held_by(), Some(LIBRARY_T));
    assert_eq!(
        storage.get_dependers_of_type("b1", "itemOf").expect("dependers"),
        vec!["h1".to_string(), "h2".to_string()]
    );
    assert!(storage.get_dependers("b2").expect("dependers").is_empty());
}
