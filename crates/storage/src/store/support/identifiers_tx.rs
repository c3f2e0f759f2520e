#![forbid(unsafe_code)]

use super::super::{IdType, StoreError};
use super::{Tables, map_insert_conflict};
use ld_core::{BaseUri, Document};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const RECORD_GRAPH_INDEX: i64 = 0;
const THING_GRAPH_INDEX: i64 = 1;

/// Rewrites the identifier rows of `id`: main id first per graph index,
/// aliases after it. Relative identifiers are stored resolved against `base`.
pub(in crate::store) fn refresh_identifiers_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    base: &BaseUri,
    id: &str,
    doc: &Document,
) -> Result<(), StoreError> {
    tx.execute(
        &format!("DELETE FROM {} WHERE id=?1", tables.identifiers),
        params![id],
    )?;

    let insert_sql = format!(
        "INSERT INTO {}(iri, id, graph_index, main_id) VALUES (?1, ?2, ?3, ?4)",
        tables.identifiers
    );
    for (graph_index, iris) in [
        (RECORD_GRAPH_INDEX, doc.record_identifiers()),
        (THING_GRAPH_INDEX, doc.thing_identifiers()),
    ] {
        let mut seen = Vec::with_capacity(iris.len());
        for iri in iris.iter().map(|iri| base.resolve(iri)) {
            if seen.contains(&iri) {
                continue;
            }
            let insert = tx.execute(&insert_sql, params![iri, id, graph_index, seen.is_empty()]);
            if let Err(err) = insert {
                return Err(map_insert_conflict(err, &iri));
            }
            seen.push(iri);
        }
    }
    Ok(())
}

pub(in crate::store) fn system_id_by_iri(
    conn: &Connection,
    tables: &Tables,
    iri: &str,
) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT id FROM {} WHERE iri=?1", tables.identifiers),
            params![iri],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

pub(in crate::store) fn id_type_by_iri(
    conn: &Connection,
    tables: &Tables,
    iri: &str,
) -> Result<Option<IdType>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT graph_index, main_id FROM {} WHERE iri=?1",
                tables.identifiers
            ),
            params![iri],
            |row| {
                Ok(IdType {
                    graph_index: row.get(0)?,
                    is_main: row.get(1)?,
                })
            },
        )
        .optional()?)
}

/// The main iri sharing system id and graph index with `iri`.
pub(in crate::store) fn main_iri_for(
    conn: &Connection,
    tables: &Tables,
    iri: &str,
) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT main.iri FROM {t} AS alias \
                 JOIN {t} AS main ON main.id = alias.id AND main.graph_index = alias.graph_index \
                 WHERE alias.iri=?1 AND main.main_id=1",
                t = tables.identifiers
            ),
            params![iri],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}
