#![forbid(unsafe_code)]

use super::super::{Dependency, StoreError};
use super::{Tables, system_id_by_iri};
use ld_core::{BaseUri, Document};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::collections::{BTreeSet, HashMap, VecDeque};

const MAX_WINDOW_PASSES: usize = 4;

/// Replaces the outbound edges of `id` with the document's external links
/// that resolve to local system ids.
pub(in crate::store) fn refresh_dependencies_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    base: &BaseUri,
    id: &str,
    doc: &Document,
) -> Result<(), StoreError> {
    delete_dependencies_tx(tx, tables, id)?;

    let mut edges = BTreeSet::new();
    for link in doc.external_refs() {
        if let Some(target) = system_id_by_iri(tx, tables, &base.resolve(&link.iri))? {
            if target != id {
                edges.insert((link.relation, target));
            }
        }
    }

    let insert_sql = format!(
        "INSERT OR IGNORE INTO {}(id, relation, dependson_id) VALUES (?1, ?2, ?3)",
        tables.dependencies
    );
    for (relation, target) in edges {
        tx.execute(&insert_sql, params![id, relation, target])?;
    }
    Ok(())
}

pub(in crate::store) fn delete_dependencies_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
) -> Result<(), StoreError> {
    tx.execute(
        &format!("DELETE FROM {} WHERE id=?1", tables.dependencies),
        params![id],
    )?;
    Ok(())
}

pub(in crate::store) fn dependencies_of(
    conn: &Connection,
    tables: &Tables,
    id: &str,
) -> Result<Vec<Dependency>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT relation, dependson_id FROM {} WHERE id=?1 ORDER BY relation, dependson_id",
        tables.dependencies
    ))?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(Dependency {
            relation: row.get(0)?,
            id: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(in crate::store) fn dependers_of(
    conn: &Connection,
    tables: &Tables,
    id: &str,
) -> Result<Vec<Dependency>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT relation, id FROM {} WHERE dependson_id=?1 ORDER BY relation, id",
        tables.dependencies
    ))?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(Dependency {
            relation: row.get(0)?,
            id: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn depender_ids(conn: &Connection, tables: &Tables, id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT id FROM {} WHERE dependson_id=?1 ORDER BY id",
        tables.dependencies
    ))?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

type Window = (Option<String>, Option<String>);

fn cached_window(tx: &Transaction<'_>, tables: &Tables, id: &str) -> Result<Window, StoreError> {
    Ok(tx
        .query_row(
            &format!(
                "SELECT dep_min_modified, dep_max_modified FROM {} WHERE id=?1",
                tables.main
            ),
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .unwrap_or((None, None)))
}

/// Recomputes the cached min/max modified of `id` over its own modified
/// and the cached windows of its dependencies. Returns whether it moved.
pub(in crate::store) fn refresh_modified_window_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
) -> Result<bool, StoreError> {
    let before = cached_window(tx, tables, id)?;
    tx.execute(
        &format!(
            "UPDATE {main} SET \
               dep_min_modified = (SELECT MIN(value) FROM ( \
                 SELECT modified AS value FROM {main} WHERE id=?1 \
                 UNION ALL \
                 SELECT COALESCE(m.dep_min_modified, m.modified) FROM {deps} AS d \
                   JOIN {main} AS m ON m.id = d.dependson_id WHERE d.id=?1)), \
               dep_max_modified = (SELECT MAX(value) FROM ( \
                 SELECT modified AS value FROM {main} WHERE id=?1 \
                 UNION ALL \
                 SELECT COALESCE(m.dep_max_modified, m.modified) FROM {deps} AS d \
                   JOIN {main} AS m ON m.id = d.dependson_id WHERE d.id=?1)) \
             WHERE id=?1",
            main = tables.main,
            deps = tables.dependencies
        ),
        params![id],
    )?;
    Ok(cached_window(tx, tables, id)? != before)
}

/// Pushes a changed window of `id` out to everything depending on it.
///
/// Direct dependers are always refreshed; further hops only while windows
/// keep moving, and each document is revisited a bounded number of times
/// so dependency cycles terminate.
pub(in crate::store) fn propagate_to_dependers_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
) -> Result<usize, StoreError> {
    let mut passes: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<String> = depender_ids(tx, tables, id)?.into();
    let mut refreshed = 0;

    while let Some(next) = queue.pop_front() {
        if next == id {
            continue;
        }
        let seen = passes.entry(next.clone()).or_insert(0);
        if *seen >= MAX_WINDOW_PASSES {
            continue;
        }
        *seen += 1;

        refreshed += 1;
        if refresh_modified_window_tx(tx, tables, &next)? {
            queue.extend(depender_ids(tx, tables, &next)?);
        }
    }
    Ok(refreshed)
}
