#![forbid(unsafe_code)]

use ld_core::Document;
use ld_storage::{
    Dependency, HOLDING_COLLECTION, IndexSink, PageRequest, REINDEX_SYNC_LIMIT, ReindexPlan,
    Storage, StoreConfig, StoreRequest, UpdateRequest,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Mutex;

const BASE: &str = "https://id.example.org/";

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

fn record(id: &str, thing: Value) -> Document {
    let mut thing = thing;
    thing["@id"] = json!(format!("{BASE}{id}#it"));
    Document::new(json!({"@graph": [
        {"@id": format!("{BASE}{id}"), "mainEntity": {"@id": format!("{BASE}{id}#it")}},
        thing
    ]}))
}

fn link(id: &str) -> Value {
    json!({"@id": format!("{BASE}{id}#it")})
}

fn store(storage: &Storage, doc: Document) -> Document {
    let mut doc = doc;
    storage
        .store(&mut doc, &StoreRequest::new("bib", "test"))
        .expect("store");
    doc
}

fn page(limit: usize, offset: usize) -> PageRequest {
    PageRequest { limit, offset }
}

fn ids(storage: &Storage, docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|doc| storage.system_id_of(doc).expect("system id"))
        .collect()
}

#[test]
fn links_to_stored_documents_become_dependencies() {
    let storage = open("links_to_stored_documents_become_dependencies");
    store(&storage, record("w1", json!({"@type": "Work"})));
    store(
        &storage,
        record(
            "i1",
            json!({"@type": "Instance", "instanceOf": link("w1"), "subject": [link("w1"), link("nowhere")]}),
        ),
    );

    assert_eq!(
        storage.get_dependencies("i1").expect("dependencies"),
        vec![
            Dependency {
                relation: "instanceOf".to_string(),
                id: "w1".to_string()
            },
            Dependency {
                relation: "subject".to_string(),
                id: "w1".to_string()
            },
        ]
    );
    assert_eq!(
        storage.get_dependers_of_type("w1", "subject").expect("dependers"),
        vec!["i1".to_string()]
    );
    assert_eq!(
        storage
            .get_dependencies_of_type("i1", "instanceOf")
            .expect("dependencies"),
        vec!["w1".to_string()]
    );

    storage
        .store_atomic_update("i1", &UpdateRequest::new("test"), |doc| {
            doc.data_mut()["@graph"][1]
                .as_object_mut()
                .ok_or("thing is not an object")?
                .remove("subject");
            Ok::<(), &str>(())
        })
        .expect("drop subject");
    assert_eq!(
        storage.get_dependers("w1").expect("dependers"),
        vec![Dependency {
            relation: "instanceOf".to_string(),
            id: "i1".to_string()
        }]
    );
}

#[test]
fn modified_windows_follow_dependency_chains() {
    let storage = open("modified_windows_follow_dependency_chains");
    let work = store(&storage, record("w1", json!({"@type": "Work"})));
    let instance = store(
        &storage,
        record("i1", json!({"@type": "Instance", "instanceOf": link("w1")})),
    );
    store(
        &storage,
        record("e1", json!({"@type": "Electronic", "reproductionOf": link("i1")})),
    );

    let window = storage
        .dependency_window("i1")
        .expect("window")
        .expect("window present");
    assert_eq!(Some(window.min), work.modified());
    assert_eq!(Some(window.max), instance.modified());

    let updated = storage
        .store_atomic_update("w1", &UpdateRequest::new("test"), |doc| {
            doc.data_mut()["@graph"][1]["title"] = json!("Revised");
            Ok::<(), String>(())
        })
        .expect("update work");

    for id in ["i1", "e1"] {
        let window = storage
            .dependency_window(id)
            .expect("window")
            .expect("window present");
        assert_eq!(Some(window.max), updated.modified(), "window of {id}");
    }

    let combined = storage
        .get_min_max_modified(&["e1", "i1", "unknown"])
        .expect("min max")
        .expect("window present");
    assert_eq!(Some(combined.max), updated.modified());
    assert!(combined.min <= combined.max);
    assert!(
        storage
            .get_min_max_modified(&["unknown"])
            .expect("min max")
            .is_none()
    );
    assert!(
        storage
            .get_min_max_modified::<&str>(&[])
            .expect("min max")
            .is_none()
    );
}

#[test]
fn dependency_cycles_terminate() {
    let storage = open("dependency_cycles_terminate");
    store(&storage, record("a", json!({"@type": "Work"})));
    store(&storage, record("b", json!({"@type": "Work", "related": link("a")})));
    storage
        .store_atomic_update("a", &UpdateRequest::new("test"), |doc| {
            doc.data_mut()["@graph"][1]["related"] = link("b");
            Ok::<(), String>(())
        })
        .expect("close the cycle");

    let updated = storage
        .store_atomic_update("b", &UpdateRequest::new("test"), |doc| {
            doc.data_mut()["@graph"][1]["title"] = json!("B");
            Ok::<(), String>(())
        })
        .expect("update inside the cycle");
    let window = storage
        .dependency_window("a")
        .expect("window")
        .expect("window present");
    assert_eq!(Some(window.max), updated.modified());
}

#[test]
fn finds_match_single_and_list_links() {
    let storage = open("finds_match_single_and_list_links");
    store(&storage, record("w1", json!({"@type": "Work"})));
    store(
        &storage,
        record("i1", json!({"@type": "Instance", "instanceOf": link("w1"), "title": "Kalldrag"})),
    );
    store(
        &storage,
        record("i2", json!({"@type": "Instance", "instanceOf": [link("w1")], "title": ["Kalldrag"]})),
    );
    store(
        &storage,
        record("i3", json!({"@type": "Instance", "instanceOf": link("w2"), "title": "Annat"})),
    );
    let mut quoting = record("q1", json!({"@type": "Instance"}));
    quoting.data_mut()["@graph"]
        .as_array_mut()
        .expect("graph list")
        .push(json!({"@graph": {"@id": format!("{BASE}w1#it"), "@type": "Work"}}));
    store(&storage, quoting);

    let work = format!("{BASE}w1#it");
    let found = storage
        .find_by_relation(&work, "instanceOf", &page(10, 0))
        .expect("find by relation");
    assert_eq!(ids(&storage, &found), vec!["i1", "i2"]);
    assert_eq!(storage.count_by_relation(&work, "instanceOf").expect("count"), 2);
    let second = storage
        .find_by_relation(&work, "instanceOf", &page(1, 1))
        .expect("second page");
    assert_eq!(ids(&storage, &second), vec!["i2"]);

    let found = storage
        .find_by_value("title", "Kalldrag", &page(10, 0))
        .expect("find by value");
    assert_eq!(ids(&storage, &found), vec!["i1", "i2"]);
    assert_eq!(storage.count_by_value("title", "Annat").expect("count"), 1);

    let found = storage
        .find_by_quotation(&work, &page(10, 0))
        .expect("find by quotation");
    assert_eq!(ids(&storage, &found), vec!["q1"]);
    assert_eq!(storage.count_by_quotation(&work).expect("count"), 1);

    storage
        .remove("i1", &UpdateRequest::new("test"))
        .expect("remove i1");
    assert_eq!(storage.count_by_relation(&work, "instanceOf").expect("count"), 1);
}

#[test]
fn translated_queries_filter_and_sort() {
    use ld_storage::StorageRepresentation;

    let storage = open("translated_queries_filter_and_sort");
    for id in ["i1", "i2", "i3"] {
        store(
            &storage,
            record(id, json!({"@type": "Instance", "carrier": "paper"})),
        );
    }
    store(
        &storage,
        record("i4", json!({"@type": "Instance", "carrier": "online"})),
    );

    let found = storage
        .query(
            "carrier",
            "paper",
            StorageRepresentation::JsonLdGraph,
            None,
            &page(10, 0),
        )
        .expect("query");
    assert_eq!(ids(&storage, &found), vec!["i1", "i2", "i3"]);

    let found = storage
        .query(
            "carrier",
            "paper",
            StorageRepresentation::JsonLdGraph,
            Some("-1.@id"),
            &page(2, 0),
        )
        .expect("sorted query");
    assert_eq!(ids(&storage, &found), vec!["i3", "i2"]);

    assert!(
        storage
            .query(
                "carrier'",
                "paper",
                StorageRepresentation::JsonLdGraph,
                None,
                &page(10, 0)
            )
            .is_err()
    );
}

#[test]
fn load_all_streams_live_documents_in_pages() {
    let storage = open("load_all_streams_live_documents_in_pages");
    let mut batch: Vec<Document> = (0..150)
        .map(|n| record(&format!("d{n:03}"), json!({"@type": "Instance"})))
        .collect();
    storage
        .bulk_store(&mut batch, &StoreRequest::new("bib", "bulk"))
        .expect("bulk store");
    let mut held = record("h1", json!({"@type": "Item"}));
    storage
        .store(&mut held, &StoreRequest::new("hold-import", "test"))
        .expect("store other collection");
    storage
        .remove("d000", &UpdateRequest::new("test"))
        .expect("remove one");

    let all: Vec<Document> = storage
        .load_all(&Default::default())
        .expect("stream")
        .collect::<Result<_, _>>()
        .expect("documents");
    assert_eq!(all.len(), 150);
    let mut seen = ids(&storage, &all);
    assert!(!seen.contains(&"d000".to_string()));
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 150);
    assert!(
        all.windows(2)
            .all(|pair| pair[0].modified() <= pair[1].modified())
    );

    let request = ld_storage::LoadAllRequest {
        collection: Some("hold-import".to_string()),
        ..Default::default()
    };
    let only = storage.load_all(&request).expect("stream");
    assert_eq!(only.count(), 1);

    let request = ld_storage::LoadAllRequest {
        since: held.modified(),
        ..Default::default()
    };
    let recent: Vec<Document> = storage
        .load_all(&request)
        .expect("stream")
        .collect::<Result<_, _>>()
        .expect("documents");
    assert!(recent.iter().all(|doc| doc.modified() >= held.modified()));
    assert!(ids(&storage, &recent).contains(&"h1".to_string()));

    let mut partial = storage.load_all(&Default::default()).expect("stream");
    assert!(partial.next().is_some());
    assert_eq!(storage.pool_metrics().outstanding, 1);
    drop(partial);
    assert_eq!(storage.pool_metrics().outstanding, 0);
}

#[derive(Default)]
struct RecordingSink {
    indexed: Mutex<Vec<(String, String)>>,
    reindexed: Mutex<Vec<String>>,
}

impl IndexSink for RecordingSink {
    fn index(&self, doc: &Document, collection: &str) {
        self.indexed
            .lock()
            .expect("indexed lock")
            .push((doc.record_id().unwrap_or_default().to_string(), collection.to_string()));
    }

    fn reindex_dependers(&self, ids: &[String]) {
        self.reindexed
            .lock()
            .expect("reindexed lock")
            .extend(ids.iter().cloned());
    }
}

#[test]
fn notify_reindexes_few_dependers_inline() {
    let storage = open("notify_reindexes_few_dependers_inline");
    let work = store(&storage, record("w1", json!({"@type": "Work"})));
    store(
        &storage,
        record("i1", json!({"@type": "Instance", "instanceOf": link("w1")})),
    );
    let mut item = record("h1", json!({"@type": "Item", "itemOf": link("w1"), "heldBy": {"@id": "https://libris.example.org/library/S"}}));
    storage
        .store(&mut item, &StoreRequest::new(HOLDING_COLLECTION, "test"))
        .expect("store holding");

    assert_eq!(storage.dependers_for_reindex("w1").expect("dependers"), vec!["i1"]);

    let sink = RecordingSink::default();
    let plan = storage.notify(&sink, &work, "bib").expect("notify");
    assert_eq!(plan, ReindexPlan::Sync(vec!["i1".to_string()]));
    assert_eq!(
        *sink.indexed.lock().expect("indexed lock"),
        vec![(format!("{BASE}w1"), "bib".to_string())]
    );
    assert_eq!(*sink.reindexed.lock().expect("reindexed lock"), vec!["i1"]);
}

#[test]
fn notify_defers_many_dependers() {
    let storage = open("notify_defers_many_dependers");
    let work = store(&storage, record("w1", json!({"@type": "Work"})));
    let mut instances: Vec<Document> = (0..REINDEX_SYNC_LIMIT)
        .map(|n| {
            record(
                &format!("i{n:02}"),
                json!({"@type": "Instance", "instanceOf": link("w1")}),
            )
        })
        .collect();
    storage
        .bulk_store(&mut instances, &StoreRequest::new("bib", "bulk"))
        .expect("bulk store");

    let sink = RecordingSink::default();
    match storage.notify(&sink, &work, "bib").expect("notify") {
        ReindexPlan::Background(ids) => assert_eq!(ids.len(), REINDEX_SYNC_LIMIT),
        other => panic!("unexpected plan: {other:?}"),
    }
    assert_eq!(sink.indexed.lock().expect("indexed lock").len(), 1);
    assert!(sink.reindexed.lock().expect("reindexed lock").is_empty());
}
