#![forbid(unsafe_code)]

//! Field-path queries translated to `json_contains` containment tests.
//!
//! A key such as `245.a` or `items.title` names a position inside the stored
//! JSON; the translation wraps the value in the structure that position
//! implies for the given representation and pairs it with the SQL path
//! expression the structure must be contained in.

use crate::store::StoreError;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageRepresentation {
    /// `{"@graph": [...]}` as written by the store.
    JsonLdGraph,
    /// `{"descriptions": {"entry": ..., "items": [...]}}`.
    JsonLdFlatWithDescriptions,
    /// `{"fields": [{"245": {"subfields": [{"a": ...}]}}]}`.
    Marc21Json,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContainmentQuery {
    pub path: String,
    pub pattern: Value,
}

impl ContainmentQuery {
    /// The SQL condition. Its single parameter is `?1`, bound to
    /// [`ContainmentQuery::param`].
    pub fn sql(&self) -> String {
        format!("json_contains({}, ?1)", self.path)
    }

    pub fn param(&self) -> String {
        self.pattern.to_string()
    }
}

pub fn translate_to_sql(
    key: &str,
    value: &str,
    representation: StorageRepresentation,
) -> Result<ContainmentQuery, StoreError> {
    let parts = split_key(key)?;
    let leaf = Value::String(value.to_string());

    let query = match representation {
        StorageRepresentation::Marc21Json => {
            let field = match parts.as_slice() {
                [tag] => single(tag, leaf),
                [tag, code] => single(
                    tag,
                    single("subfields", Value::Array(vec![single(code, leaf)])),
                ),
                _ => return Err(StoreError::InvalidInput("marc keys are tag or tag.code")),
            };
            ContainmentQuery {
                path: "data".to_string(),
                pattern: single("fields", Value::Array(vec![field])),
            }
        }
        StorageRepresentation::JsonLdFlatWithDescriptions => match parts.split_first() {
            Some((&"entry", rest)) if !rest.is_empty() => ContainmentQuery {
                path: "data->'descriptions'->'entry'".to_string(),
                pattern: nest(rest, leaf),
            },
            Some((&"items", rest)) if !rest.is_empty() => ContainmentQuery {
                path: "data->'descriptions'->'items'".to_string(),
                pattern: Value::Array(vec![nest(rest, leaf)]),
            },
            _ => ContainmentQuery {
                path: "data->'descriptions'->'items'".to_string(),
                pattern: Value::Array(vec![nest(&parts, leaf)]),
            },
        },
        StorageRepresentation::JsonLdGraph => ContainmentQuery {
            path: "data->'$.\"@graph\"'".to_string(),
            pattern: Value::Array(vec![nest(&parts, leaf)]),
        },
    };
    Ok(query)
}

/// Comma separated sort keys to an ORDER BY list; `-key` sorts descending.
pub fn translate_sort(
    keys: &str,
    representation: StorageRepresentation,
) -> Result<String, StoreError> {
    let mut clauses = Vec::new();
    for raw in keys.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (field, direction) = match raw.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (raw, "ASC"),
        };
        let parts = split_key(field)?;
        let expression = match representation {
            StorageRepresentation::Marc21Json => match parts.as_slice() {
                [tag] => format!("data->'fields'->'{tag}'"),
                [tag, code] => format!("data->'fields'->'{tag}'->'subfields'->'{code}'"),
                _ => return Err(StoreError::InvalidInput("marc keys are tag or tag.code")),
            },
            StorageRepresentation::JsonLdFlatWithDescriptions => match parts.split_first() {
                Some((&"entry", rest)) if !rest.is_empty() => {
                    format!("data->'descriptions'->'entry'{}", arrows(rest))
                }
                Some((&"items", rest)) if !rest.is_empty() => {
                    format!("data->'descriptions'->'items'{}", arrows(rest))
                }
                _ => format!("data->'descriptions'->'items'{}", arrows(&parts)),
            },
            StorageRepresentation::JsonLdGraph => {
                format!("data->'$.\"@graph\"'{}", arrows(&parts))
            }
        };
        clauses.push(format!("{expression} {direction}"));
    }

    if clauses.is_empty() {
        return Err(StoreError::InvalidInput("empty sort"));
    }
    Ok(clauses.join(", "))
}

fn split_key(key: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = key.trim().split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(StoreError::InvalidInput("empty key segment"));
    }
    if parts
        .iter()
        .any(|part| part.contains('\'') || part.contains('"') || part.contains('\\'))
    {
        return Err(StoreError::InvalidInput("quote in key segment"));
    }
    Ok(parts)
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn nest(parts: &[&str], leaf: Value) -> Value {
    parts
        .iter()
        .rev()
        .fold(leaf, |inner, part| single(part, inner))
}

// numeric segments index arrays, the rest are object labels
fn arrows(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            if part.bytes().all(|b| b.is_ascii_digit()) {
                format!("->{part}")
            } else {
                format!("->'{part}'")
            }
        })
        .collect()
}
