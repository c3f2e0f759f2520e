use super::*;
use crate::path;
use serde_json::json;

#[test]
fn get_follows_keys_and_indices() {
    let data = json!({"@graph": [{"@id": "https://id.example.org/abc"}]});
    assert_eq!(
        get(&data, &path!["@graph", 0, "@id"]),
        Some(&json!("https://id.example.org/abc"))
    );
    assert_eq!(get(&data, &path!["@graph", 1, "@id"]), None);
    assert_eq!(get(&data, &path!["missing", "deeper"]), None);
}

#[test]
fn try_get_reports_container_mismatch() {
    let data = json!({"@graph": {"@id": "x"}});
    let err = try_get(&data, &path!["@graph", 0]).unwrap_err();
    assert_eq!(
        err,
        PathError::ContainerMismatch {
            position: 1,
            step: PathStep::Index(0),
            expected: ContainerKind::List,
            found: ContainerKind::Map,
        }
    );
    assert_eq!(get(&data, &path!["@graph", 0]), None);
}

#[test]
fn set_creates_containers_from_next_step() {
    let mut data = json!({});
    set(&mut data, &path!["@graph", 1, "sameAs", 0, "@id"], json!("x")).unwrap();
    assert_eq!(
        data,
        json!({"@graph": [null, {"sameAs": [{"@id": "x"}]}]})
    );
}

#[test]
fn set_overwrites_existing_leaf() {
    let mut data = json!({"@graph": [{"@id": "a", "created": "old"}]});
    set(&mut data, &path!["@graph", 0, "created"], json!("new")).unwrap();
    assert_eq!(data["@graph"][0]["created"], json!("new"));
    assert_eq!(data["@graph"][0]["@id"], json!("a"));
}

#[test]
fn set_refuses_wrong_intermediate_kind() {
    let mut data = json!({"@graph": {"not": "a list"}});
    let before = data.clone();
    let err = set(&mut data, &path!["@graph", 0, "@id"], json!("x")).unwrap_err();
    assert!(matches!(err, PathError::ContainerMismatch { position: 1, .. }));
    assert_eq!(data, before);

    let mut data = json!({"@graph": [["nested"]]});
    let err = set(&mut data, &path!["@graph", 0, "@id"], json!("x")).unwrap_err();
    assert!(matches!(
        err,
        PathError::ContainerMismatch {
            expected: ContainerKind::Map,
            found: ContainerKind::List,
            ..
        }
    ));
}

#[test]
fn remove_drops_keys_and_list_entries() {
    let mut data = json!({"a": {"b": 1, "c": 2}, "l": [1, 2, 3]});
    assert_eq!(remove(&mut data, &path!["a", "b"]).unwrap(), Some(json!(1)));
    assert_eq!(remove(&mut data, &path!["l", 0]).unwrap(), Some(json!(1)));
    assert_eq!(remove(&mut data, &path!["missing", "x"]).unwrap(), None);
    assert_eq!(data, json!({"a": {"c": 2}, "l": [2, 3]}));
}

#[test]
fn path_display_joins_steps() {
    assert_eq!(path!["@graph", 0, "@id"].to_string(), "@graph/0/@id");
    assert!(Path::default().is_empty());
}
