#![forbid(unsafe_code)]

//! Structural content checksum.
//!
//! Not a cryptographic hash. It must stay stable for equal graphs, ignore
//! the audit timestamps, and move whenever any other value changes. Map
//! entries are summed (key order is irrelevant); list entries are weighted
//! by position (element order matters).

use crate::jsonld::{CREATED_KEY, MODIFIED_KEY};
use serde_json::Value;

pub fn checksum(value: &Value) -> i64 {
    node_checksum(value, 1)
}

/// 32-bit polynomial string hash over UTF-16 code units (`s[0]*31^(n-1) + ...`).
pub fn java_string_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

fn node_checksum(node: &Value, depth: i32) -> i64 {
    match node {
        Value::Null => 0,
        Value::String(value) => i64::from(java_string_hash(value).wrapping_mul(depth)),
        Value::Bool(value) => {
            if *value {
                i64::from(depth)
            } else {
                0
            }
        }
        Value::Number(number) => match number.as_i64() {
            Some(value) => value.wrapping_mul(i64::from(depth)),
            None => i64::from(java_string_hash(&number.to_string()).wrapping_mul(depth)),
        },
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| key.as_str() != CREATED_KEY && key.as_str() != MODIFIED_KEY)
            .fold(0i64, |term, (key, value)| {
                term.wrapping_add(i64::from(java_string_hash(key).wrapping_mul(depth)))
                    .wrapping_add(node_checksum(value, depth.wrapping_add(1)))
            }),
        Value::Array(items) => items
            .iter()
            .zip(1i32..)
            .fold(0i64, |term, (item, position)| {
                term.wrapping_add(node_checksum(item, depth.wrapping_add(position)))
            }),
    }
}
