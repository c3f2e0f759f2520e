#![forbid(unsafe_code)]

//! The flatten/frame subset of JSON-LD used by the store.
//!
//! Every transform here is a pure function over `serde_json::Value`.

mod flatten;
mod frame;

pub use flatten::{MAX_FLATTEN_DEPTH, flatten};
pub use frame::{FramingError, MAX_EMBED_DEPTH, frame, frame_and_expand};

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GRAPH_KEY: &str = "@graph";
pub const ID_KEY: &str = "@id";
pub const TYPE_KEY: &str = "@type";
pub const DESCRIPTIONS_KEY: &str = "descriptions";
pub const ENTRY_KEY: &str = "entry";
pub const ITEMS_KEY: &str = "items";
pub const QUOTED_KEY: &str = "quoted";
pub const SAME_AS_KEY: &str = "sameAs";
pub const CREATED_KEY: &str = "created";
pub const MODIFIED_KEY: &str = "modified";

pub type IdMap = BTreeMap<String, Map<String, Value>>;

pub fn is_flat(doc: &Value) -> bool {
    let Value::Object(map) = doc else {
        return false;
    };
    map.get(GRAPH_KEY).is_some_and(Value::is_array) || map.contains_key(DESCRIPTIONS_KEY)
}

pub fn is_framed(doc: &Value) -> bool {
    let Value::Object(map) = doc else {
        return false;
    };
    !map.contains_key(GRAPH_KEY) && !map.contains_key(DESCRIPTIONS_KEY)
}

/// `{"@id": X}` and nothing else.
pub fn is_reference(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(ID_KEY).is_some_and(Value::is_string),
        _ => false,
    }
}

pub fn reference(id: impl Into<String>) -> Value {
    let mut map = Map::new();
    map.insert(ID_KEY.to_string(), Value::String(id.into()));
    Value::Object(map)
}

pub fn node_id(value: &Value) -> Option<&str> {
    value.get(ID_KEY).and_then(Value::as_str)
}

/// Id → node map over either flat form.
///
/// In the `@graph` form a later node with an id already seen fills in only
/// the keys the earlier node lacks. Nodes of quoted sub-graphs are skipped
/// unless `include_quoted` is set.
pub fn id_map(doc: &Value, include_quoted: bool) -> IdMap {
    let mut out = IdMap::new();
    let Value::Object(map) = doc else {
        return out;
    };

    if let Some(Value::Array(graph)) = map.get(GRAPH_KEY) {
        for entry in graph {
            match entry.get(GRAPH_KEY) {
                Some(quoted) => {
                    if include_quoted {
                        for node in graph_nodes(quoted) {
                            merge_into(&mut out, node);
                        }
                    }
                }
                None => merge_into(&mut out, entry),
            }
        }
        return out;
    }

    if let Some(descriptions) = map.get(DESCRIPTIONS_KEY) {
        if let Some(entry) = descriptions.get(ENTRY_KEY) {
            insert_node(&mut out, entry);
        }
        if let Some(Value::Array(items)) = descriptions.get(ITEMS_KEY) {
            for item in items {
                insert_node(&mut out, item);
            }
        }
        if include_quoted {
            if let Some(Value::Array(quoted)) = descriptions.get(QUOTED_KEY) {
                for entry in quoted {
                    match entry.get(GRAPH_KEY) {
                        Some(inner) => graph_nodes(inner).for_each(|node| insert_node(&mut out, node)),
                        None => insert_node(&mut out, entry),
                    }
                }
            }
        }
    }
    out
}

/// Direct `@graph` members that carry an `@id`; nested graphs are not entered.
pub fn objects_with_id(doc: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Some(Value::Array(graph)) = doc.get(GRAPH_KEY) {
        for entry in graph {
            if let Some(id) = node_id(entry) {
                out.insert(id.to_string(), entry.clone());
            }
        }
    }
    out
}

/// Every reference-shaped object reachable from `value`, paired with the
/// nearest enclosing key.
pub fn references(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_references(value, None, &mut out);
    out
}

fn collect_references(value: &Value, relation: Option<&str>, out: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_references(item, relation, out);
            }
        }
        Value::Object(map) => {
            if let (Some(relation), Some(id)) = (relation, node_id(value)) {
                out.push((relation.to_string(), id.to_string()));
            }
            for (key, child) in map {
                if key == ID_KEY {
                    continue;
                }
                collect_references(child, Some(key), out);
            }
        }
        _ => {}
    }
}

fn graph_nodes(value: &Value) -> impl Iterator<Item = &Value> {
    let nodes: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };
    nodes.into_iter()
}

fn insert_node(out: &mut IdMap, node: &Value) {
    if let (Some(id), Value::Object(map)) = (node_id(node), node) {
        out.insert(id.to_string(), map.clone());
    }
}

fn merge_into(out: &mut IdMap, node: &Value) {
    let (Some(id), Value::Object(map)) = (node_id(node), node) else {
        return;
    };
    match out.get_mut(id) {
        Some(existing) => {
            for (key, value) in map {
                existing.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        None => {
            out.insert(id.to_string(), map.clone());
        }
    }
}
