#![forbid(unsafe_code)]

use super::{
    DESCRIPTIONS_KEY, ENTRY_KEY, GRAPH_KEY, ID_KEY, IdMap, SAME_AS_KEY, id_map, is_flat,
    is_framed, is_reference, node_id,
};
use crate::ids::{is_absolute, path_of};
use serde_json::{Map, Value};
use std::borrow::Cow;

pub const MAX_EMBED_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("Missing '@graph' key in input")]
    MissingGraphKey,
    #[error("Circular dependency in input")]
    CircularDependency,
    #[error("JSON-LD nesting exceeds {limit} levels")]
    DepthExceeded { limit: usize },
    #[error("no node in input matches main id {0}")]
    UnknownMainId(String),
}

pub fn frame(main_id: &str, doc: &Value) -> Result<Value, FramingError> {
    frame_and_expand(main_id, doc, true)
}

/// Frames `doc` around `main_id`.
///
/// With `include_quoted` unset, nodes that only exist inside quoted
/// sub-graphs are not resolved and their references stay bare.
pub fn frame_and_expand(
    main_id: &str,
    doc: &Value,
    include_quoted: bool,
) -> Result<Value, FramingError> {
    let Value::Object(map) = doc else {
        return Err(FramingError::MissingGraphKey);
    };
    if is_framed(doc) {
        return if map.contains_key(ID_KEY) {
            Ok(doc.clone())
        } else {
            Err(FramingError::MissingGraphKey)
        };
    }
    if !is_flat(doc) {
        return Err(FramingError::MissingGraphKey);
    }

    let nodes = id_map(doc, include_quoted);
    let root_id = resolve_main_id(main_id, doc, &nodes)
        .ok_or_else(|| FramingError::UnknownMainId(main_id.to_string()))?;
    let Some(root) = nodes.get(&root_id) else {
        return Err(FramingError::UnknownMainId(main_id.to_string()));
    };

    let framer = Framer { nodes: &nodes };
    let mut chain = Vec::new();
    framer
        .embed(Some(&root_id), root, &mut chain, 0)
        .map(Value::Object)
}

struct Framer<'a> {
    nodes: &'a IdMap,
}

impl Framer<'_> {
    fn embed(
        &self,
        id: Option<&str>,
        node: &Map<String, Value>,
        chain: &mut Vec<String>,
        depth: usize,
    ) -> Result<Map<String, Value>, FramingError> {
        if let Some(id) = id {
            chain.push(id.to_string());
        }
        let embedded = node
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.to_embedded(value, chain, depth + 1)?)))
            .collect::<Result<Map<String, Value>, FramingError>>();
        if id.is_some() {
            chain.pop();
        }
        embedded
    }

    fn to_embedded(
        &self,
        value: &Value,
        chain: &mut Vec<String>,
        depth: usize,
    ) -> Result<Value, FramingError> {
        if depth > MAX_EMBED_DEPTH {
            return Err(FramingError::DepthExceeded {
                limit: MAX_EMBED_DEPTH,
            });
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.to_embedded(item, chain, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => match node_id(value) {
                None => self.embed(None, map, chain, depth).map(Value::Object),
                Some(id) => {
                    if let Some(position) = chain.iter().position(|ancestor| ancestor == id) {
                        if self.is_link_only_cycle(&chain[position..]) {
                            return Err(FramingError::CircularDependency);
                        }
                        return Ok(value.clone());
                    }
                    match self.nodes.get(id) {
                        Some(full) => self.embed(Some(id), full, chain, depth).map(Value::Object),
                        None if map.len() > 1 => {
                            self.embed(Some(id), map, chain, depth).map(Value::Object)
                        }
                        None => Ok(value.clone()),
                    }
                }
            },
            other => Ok(other.clone()),
        }
    }

    /// A back-reference closes a cycle whose members carry nothing but links.
    fn is_link_only_cycle(&self, cycle: &[String]) -> bool {
        cycle.iter().all(|id| {
            self.nodes.get(id).is_some_and(|node| {
                node.iter()
                    .all(|(key, value)| key == ID_KEY || is_link_value(value))
            })
        })
    }
}

fn is_link_value(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(is_reference),
        other => is_reference(other),
    }
}

fn resolve_main_id(main_id: &str, doc: &Value, nodes: &IdMap) -> Option<String> {
    if nodes.contains_key(main_id) {
        return Some(main_id.to_string());
    }
    if let Some(id) = nodes.keys().find(|id| same_resource(id, main_id)) {
        return Some(id.clone());
    }
    let aliased = nodes.iter().find(|(_, node)| {
        node.get(SAME_AS_KEY).is_some_and(|aliases| {
            alias_ids(aliases).any(|alias| alias == main_id || same_resource(alias, main_id))
        })
    });
    if let Some((id, _)) = aliased {
        return Some(id.clone());
    }
    first_node_id(doc).filter(|id| nodes.contains_key(id.as_str()))
}

fn alias_ids(aliases: &Value) -> impl Iterator<Item = &str> {
    let ids: Vec<&str> = match aliases {
        Value::Array(items) => items.iter().filter_map(node_id).collect(),
        other => node_id(other).into_iter().collect(),
    };
    ids.into_iter()
}

fn same_resource(candidate: &str, main_id: &str) -> bool {
    match (is_absolute(candidate), is_absolute(main_id)) {
        (true, false) => path_of(candidate) == with_leading_slash(main_id),
        (false, true) => with_leading_slash(candidate) == path_of(main_id),
        _ => false,
    }
}

fn with_leading_slash(value: &str) -> Cow<'_, str> {
    if value.starts_with('/') {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("/{value}"))
    }
}

fn first_node_id(doc: &Value) -> Option<String> {
    if let Some(Value::Array(graph)) = doc.get(GRAPH_KEY) {
        return graph
            .iter()
            .filter(|entry| entry.get(GRAPH_KEY).is_none())
            .find_map(node_id)
            .map(str::to_string);
    }
    doc.get(DESCRIPTIONS_KEY)
        .and_then(|descriptions| descriptions.get(ENTRY_KEY))
        .and_then(node_id)
        .map(str::to_string)
}
