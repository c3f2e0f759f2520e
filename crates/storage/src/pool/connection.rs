#![forbid(unsafe_code)]

use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub(crate) fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn, busy_timeout)?;
    register_functions(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

fn register_functions(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.create_scalar_function(
        "json_contains",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        json_contains_fn,
    )
}

fn json_contains_fn(ctx: &Context<'_>) -> Result<bool, rusqlite::Error> {
    let target = ctx.get::<Option<String>>(0)?;
    let pattern = ctx.get::<Option<String>>(1)?;
    let (Some(target), Some(pattern)) = (target, pattern) else {
        return Ok(false);
    };
    let target: Value = serde_json::from_str(&target)
        .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
    let pattern: Value = serde_json::from_str(&pattern)
        .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
    Ok(json_contains(&target, &pattern))
}

/// Containment in the sense of jsonb `@>`.
///
/// Objects contain objects whose every key is contained, arrays contain
/// arrays whose every element is contained by some element, scalars must be
/// equal. At the top level an array also contains a bare scalar member.
pub fn json_contains(target: &Value, pattern: &Value) -> bool {
    match (target, pattern) {
        (Value::Array(items), scalar) if !scalar.is_array() && !scalar.is_object() => {
            items.iter().any(|item| item == scalar)
        }
        _ => contains(target, pattern),
    }
}

fn contains(target: &Value, pattern: &Value) -> bool {
    match (target, pattern) {
        (Value::Object(target), Value::Object(pattern)) => pattern.iter().all(|(key, wanted)| {
            target
                .get(key)
                .is_some_and(|value| contains(value, wanted))
        }),
        (Value::Array(target), Value::Array(pattern)) => pattern
            .iter()
            .all(|wanted| target.iter().any(|item| contains(item, wanted))),
        (Value::Number(left), Value::Number(right)) => {
            left == right || left.as_f64().is_some_and(|l| right.as_f64() == Some(l))
        }
        (left, right) if !left.is_array() && !left.is_object() => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn containment_follows_jsonb_rules() {
        let doc = json!({"fields": [
            {"001": "123"},
            {"245": {"ind1": "1", "subfields": [{"a": "Kalldrag"}, {"c": "Someone"}]}}
        ]});
        assert!(json_contains(
            &doc,
            &json!({"fields": [{"245": {"subfields": [{"a": "Kalldrag"}]}}]})
        ));
        assert!(!json_contains(
            &doc,
            &json!({"fields": [{"245": {"subfields": [{"a": "Other"}]}}]})
        ));
        assert!(json_contains(&json!(["a", "b"]), &json!("a")));
        assert!(!json_contains(&json!({"x": ["a"]}), &json!({"x": "a"})));
        assert!(json_contains(&json!({"n": 1.0}), &json!({"n": 1})));
        assert!(json_contains(&json!([1, 2]), &json!([])));
    }

    #[test]
    fn function_is_callable_from_sql() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();
        let hit: bool = conn
            .query_row(
                "SELECT json_contains(?1 -> '$.\"@graph\"', ?2)",
                [
                    r#"{"@graph": [{"@id": "a", "title": "x"}]}"#,
                    r#"[{"title": "x"}]"#,
                ],
                |row| row.get(0),
            )
            .unwrap();
        assert!(hit);
        let null: bool = conn
            .query_row("SELECT json_contains(NULL, '{}')", [], |row| row.get(0))
            .unwrap();
        assert!(!null);
    }
}
