use super::*;
use time::macros::datetime;

fn base() -> BaseUri {
    BaseUri::try_new("https://id.example.org/").unwrap()
}

fn holding() -> Document {
    Document::new(json!({"@graph": [
        {
            "@id": "https://id.example.org/h1",
            "@type": "Record",
            "mainEntity": {"@id": "https://id.example.org/h1#it"}
        },
        {
            "@id": "https://id.example.org/h1#it",
            "@type": "Item",
            "itemOf": {"@id": "https://id.example.org/b1#it"},
            "heldBy": {"@id": "https://libris.kb.se/library/S"}
        }
    ]}))
}

#[test]
fn new_record_links_record_to_thing() {
    let doc = Document::new_record(&base(), "abc123");
    assert_eq!(doc.record_id(), Some("https://id.example.org/abc123"));
    assert_eq!(doc.thing_id(), Some("https://id.example.org/abc123#it"));
    assert_eq!(doc.short_id(&base()).as_deref(), Some("abc123"));
    assert!(doc.validate().is_ok());
}

#[test]
fn relative_ids_complete_against_base() {
    let mut doc = Document::new_record(&base(), "abc123");
    doc.set_record_id("/xyz");
    assert_eq!(doc.short_id(&base()).as_deref(), Some("xyz"));
    assert_eq!(
        doc.complete_id(&base()).as_deref(),
        Some("https://id.example.org/xyz")
    );
}

#[test]
fn set_thing_id_moves_main_entity() {
    let mut doc = Document::new_record(&base(), "abc123");
    doc.set_thing_id("https://id.example.org/abc123#work");
    assert_eq!(doc.thing_id(), Some("https://id.example.org/abc123#work"));
    assert_eq!(
        doc.data()["@graph"][0]["mainEntity"],
        json!({"@id": "https://id.example.org/abc123#work"})
    );
}

#[test]
fn status_follows_timestamps() {
    let mut doc = Document::new_record(&base(), "abc123");
    let created = datetime!(2024-01-01 10:00:00 UTC);
    doc.set_created(created);
    doc.set_modified(created);
    assert_eq!(doc.record_status(), Some(RecordStatus::New));

    doc.set_modified(datetime!(2024-01-02 10:00:00 UTC));
    assert_eq!(doc.record_status(), Some(RecordStatus::CorrectedOrRevised));
    assert_eq!(doc.created(), Some(created));
}

#[test]
fn delete_and_undelete() {
    let mut doc = Document::new_record(&base(), "abc123");
    let at = datetime!(2024-01-01 10:00:00 UTC);
    doc.set_created(at);
    doc.set_modified(at);

    doc.set_deleted(true);
    assert!(doc.deleted());
    doc.set_modified(datetime!(2024-01-03 10:00:00 UTC));
    assert_eq!(doc.record_status(), Some(RecordStatus::Deleted));

    doc.set_deleted(false);
    assert!(!doc.deleted());
    assert_eq!(doc.record_status(), Some(RecordStatus::CorrectedOrRevised));
}

#[test]
fn identifiers_skip_duplicates_and_main_id() {
    let mut doc = Document::new_record(&base(), "abc123");
    doc.add_record_identifier("https://id.example.org/abc123")
        .unwrap();
    doc.add_record_identifier("http://libris.kb.se/resource/bib/1")
        .unwrap();
    doc.add_record_identifier("http://libris.kb.se/resource/bib/1")
        .unwrap();
    assert_eq!(
        doc.record_identifiers(),
        vec![
            "https://id.example.org/abc123".to_string(),
            "http://libris.kb.se/resource/bib/1".to_string(),
        ]
    );

    doc.add_thing_identifier("urn:isbn:9789100000000").unwrap();
    assert_eq!(doc.thing_identifiers().len(), 2);

    let err = doc.add_record_identifier("  ").unwrap_err();
    assert!(matches!(err, DocumentError::InvalidArgument(_)));
}

#[test]
fn single_same_as_object_is_promoted_to_list() {
    let mut doc = Document::new(json!({"@graph": [
        {"@id": "r", "sameAs": {"@id": "alias1"}}
    ]}));
    doc.add_record_identifier("alias2").unwrap();
    assert_eq!(
        doc.data()["@graph"][0]["sameAs"],
        json!([{"@id": "alias1"}, {"@id": "alias2"}])
    );
}

#[test]
fn typed_identifiers_round_through_identified_by() {
    let mut doc = Document::new_record(&base(), "abc123");
    doc.add_typed_thing_identifier("ISBN", "9789100000000").unwrap();
    doc.add_typed_thing_identifier("ISBN", "9789100000000").unwrap();
    doc.add_typed_thing_identifier("ISSN", "1234-5678").unwrap();
    assert_eq!(
        doc.typed_thing_identifiers(),
        vec![
            TypedIdentifier {
                kind: "ISBN".to_string(),
                value: "9789100000000".to_string()
            },
            TypedIdentifier {
                kind: "ISSN".to_string(),
                value: "1234-5678".to_string()
            },
        ]
    );
    assert!(doc.typed_record_identifiers().is_empty());
    assert!(doc.add_typed_thing_identifier("", "x").is_err());
}

#[test]
fn holding_accessors() {
    let mut doc = holding();
    assert_eq!(doc.holding_for(), Some("https://id.example.org/b1#it"));
    assert_eq!(doc.held_by(), Some("https://libris.kb.se/library/S"));
    doc.set_held_by("https://libris.kb.se/library/Utb1");
    assert_eq!(doc.held_by(), Some("https://libris.kb.se/library/Utb1"));
    assert_eq!(doc.thing_type(), Some("Item"));
    assert_eq!(doc.record_type(), Some("Record"));
}

#[test]
fn checksum_ignores_timestamps() {
    let mut doc = holding();
    let before = doc.checksum();
    doc.set_created(datetime!(2024-01-01 10:00:00 UTC));
    doc.set_modified(datetime!(2024-01-01 10:00:00 UTC));
    doc.data_mut()["@graph"][0]
        .as_object_mut()
        .unwrap()
        .remove("recordStatus");
    assert_eq!(before, doc.checksum());

    doc.set_control_number("123");
    assert_ne!(before, doc.checksum());
}

#[test]
fn external_refs_leave_out_internal_and_alias_links() {
    let doc = Document::new(json!({"@graph": [
        {
            "@id": "https://id.example.org/b1",
            "mainEntity": {"@id": "https://id.example.org/b1#it"},
            "descriptionCreator": {"@id": "https://libris.kb.se/library/S"}
        },
        {
            "@id": "https://id.example.org/b1#it",
            "sameAs": [{"@id": "http://libris.kb.se/resource/bib/1#it"}],
            "instanceOf": {"@id": "https://id.example.org/b1#work"},
            "subject": [{"@id": "https://id.example.org/subj1"}],
            "publication": [{"@type": "Publication", "country": {"@id": "https://id.kb.se/country/sw"}}]
        },
        {
            "@id": "https://id.example.org/b1#work",
            "genreForm": {"@id": "https://id.kb.se/term/saogf/Romaner"}
        },
        {"@graph": [{"@id": "https://id.example.org/quoted", "seeAlso": {"@id": "https://x.org/q"}}]}
    ]}));
    assert_eq!(
        doc.external_refs(),
        vec![
            Link {
                relation: "country".to_string(),
                iri: "https://id.kb.se/country/sw".to_string()
            },
            Link {
                relation: "genreForm".to_string(),
                iri: "https://id.kb.se/term/saogf/Romaner".to_string()
            },
            Link {
                relation: "subject".to_string(),
                iri: "https://id.example.org/subj1".to_string()
            },
        ]
    );
}

#[test]
fn validate_reports_broken_shapes() {
    let no_graph = Document::new(json!({"@id": "x"}));
    assert!(matches!(
        no_graph.validate(),
        Err(DocumentError::Validation(_))
    ));

    let mut mismatched = Document::new_record(&base(), "abc123");
    mismatched
        .set(
            &crate::path!["@graph", 1, "@id"],
            json!("https://id.example.org/other#it"),
        )
        .unwrap();
    assert!(mismatched.validate().is_err());

    let mut bad_status = Document::new_record(&base(), "abc123");
    bad_status
        .set(&crate::path!["@graph", 0, "recordStatus"], json!("marc:Bogus"))
        .unwrap();
    assert!(bad_status.validate().is_err());
}

#[test]
fn writes_into_wrong_containers_are_skipped() {
    let mut doc = Document::new(json!({"@graph": {"not": "a list"}}));
    doc.set_record_id("r");
    assert_eq!(doc.record_id(), None);
    assert!(doc.set(&crate::path!["@graph", 0], json!({})).is_err());
    assert!(doc.add_record_identifier("alias").is_err());
}

#[test]
fn serializes_as_bare_json() {
    let doc = holding();
    let raw = doc.to_json_string().unwrap();
    let back = Document::from_json_str(&raw).unwrap();
    assert_eq!(back, doc);
    assert_eq!(serde_json::to_value(&doc).unwrap(), *doc.data());
    assert!(Document::from_json_str("{not json").is_err());
}
