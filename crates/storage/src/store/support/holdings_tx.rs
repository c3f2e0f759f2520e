#![forbid(unsafe_code)]

use super::super::StoreError;
use super::{Tables, lock_row_tx, system_id_by_iri};
use ld_core::{BaseUri, Document};
use rusqlite::{Connection, Transaction, params};

const ITEM_OF: &str = "itemOf";

/// Non-deleted holdings attached to the bib `bib_id` through `itemOf`.
pub(in crate::store) fn holdings_of_bib(
    conn: &Connection,
    tables: &Tables,
    bib_id: &str,
) -> Result<Vec<(String, Document)>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT m.id, m.data FROM {deps} AS d JOIN {main} AS m ON m.id = d.id \
         WHERE d.dependson_id=?1 AND d.relation=?2 AND m.deleted=0 ORDER BY m.id",
        deps = tables.dependencies,
        main = tables.main
    ))?;
    let rows = stmt.query_map(params![bib_id, ITEM_OF], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, data) = row?;
        out.push((id, Document::from_json_str(&data)?));
    }
    Ok(out)
}

/// Resolves the holding's target bib, locks it and refuses a second live
/// holding from the same library. Returns the bib's system id.
pub(in crate::store) fn check_holding_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    base: &BaseUri,
    holding: &Document,
    own_id: &str,
) -> Result<String, StoreError> {
    let Some(target) = holding.holding_for() else {
        return Err(StoreError::InvalidInput("holding has no itemOf"));
    };
    let target = base.resolve(target);
    let Some(bib) = system_id_by_iri(tx, tables, &target)? else {
        return Err(StoreError::HoldingTargetNotFound { iri: target });
    };
    lock_row_tx(tx, tables, &bib)?;

    let Some(held_by) = holding.held_by() else {
        return Ok(bib);
    };
    for (id, existing) in holdings_of_bib(tx, tables, &bib)? {
        if id != own_id && existing.held_by() == Some(held_by) {
            tracing::info!(bib = %bib, held_by, existing = %id, "conflicting holding");
            return Err(StoreError::ConflictingHold {
                bib,
                held_by: held_by.to_string(),
            });
        }
    }
    Ok(bib)
}
