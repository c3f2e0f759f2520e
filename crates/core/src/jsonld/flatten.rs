#![forbid(unsafe_code)]

use super::{FramingError, GRAPH_KEY, ID_KEY, MAX_EMBED_DEPTH, is_flat, reference};
use serde_json::{Map, Value};

/// Deepest map or list nesting `flatten` walks into. Every embedded node
/// may sit inside a list, so this is twice the embedding limit of `frame`.
pub const MAX_FLATTEN_DEPTH: usize = 2 * MAX_EMBED_DEPTH;

/// Detaches every identified node of a framed tree into a `@graph` list.
///
/// Nodes are collected in post-order and emitted reversed, which puts the
/// root first. Identified maps that carry nothing but `@id` become plain
/// references and are not listed; anonymous maps stay inline.
pub fn flatten(doc: &Value) -> Result<Value, FramingError> {
    if is_flat(doc) || doc.get(ID_KEY).is_none() {
        return Ok(doc.clone());
    }

    let mut nodes = Vec::new();
    store_flattened(doc, 0, &mut nodes)?;
    nodes.reverse();

    let mut out = Map::new();
    out.insert(GRAPH_KEY.to_string(), Value::Array(nodes));
    Ok(Value::Object(out))
}

fn store_flattened(
    current: &Value,
    depth: usize,
    nodes: &mut Vec<Value>,
) -> Result<Value, FramingError> {
    if depth > MAX_FLATTEN_DEPTH {
        return Err(FramingError::DepthExceeded {
            limit: MAX_FLATTEN_DEPTH,
        });
    }
    match current {
        Value::Object(map) => {
            let flattened = make_flat(map, depth + 1, nodes)?;
            match map.get(ID_KEY) {
                Some(Value::String(id)) => {
                    if flattened.len() > 1 {
                        let node = Value::Object(flattened);
                        if !nodes.contains(&node) {
                            nodes.push(node);
                        }
                    }
                    Ok(reference(id.clone()))
                }
                _ => Ok(Value::Object(flattened)),
            }
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| store_flattened(item, depth + 1, nodes))
                .collect::<Result<_, _>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn make_flat(
    map: &Map<String, Value>,
    depth: usize,
    nodes: &mut Vec<Value>,
) -> Result<Map<String, Value>, FramingError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), store_flattened(value, depth, nodes)?)))
        .collect()
}
