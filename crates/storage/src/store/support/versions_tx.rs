#![forbid(unsafe_code)]

use super::super::StoreError;
use super::{RowWrite, Tables, document_from_columns};
use ld_core::Document;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

/// Appends a version row unless the newest version of `id` already carries
/// the same checksum. Returns whether a row was written.
pub(in crate::store) fn insert_version_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
    row: &RowWrite<'_>,
) -> Result<bool, StoreError> {
    let latest: Option<String> = tx
        .query_row(
            &format!(
                "SELECT checksum FROM {} WHERE id=?1 ORDER BY pk DESC LIMIT 1",
                tables.versions
            ),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    if latest.as_deref() == Some(row.checksum.as_str()) {
        tracing::debug!(id, checksum = %row.checksum, "version unchanged, not recorded");
        return Ok(false);
    }

    tx.execute(
        &format!(
            "INSERT INTO {}(id, data, collection, changed_in, changed_by, checksum, deleted, created, modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            tables.versions
        ),
        params![
            id,
            row.data,
            row.collection,
            row.changed_in,
            row.changed_by,
            row.checksum,
            row.deleted,
            row.created,
            row.modified,
        ],
    )?;
    Ok(true)
}

/// The newest version of `id` with the given checksum.
pub(in crate::store) fn load_version(
    conn: &Connection,
    tables: &Tables,
    id: &str,
    checksum: &str,
) -> Result<Option<Document>, StoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT data, created, modified FROM {} WHERE id=?1 AND checksum=?2 \
                 ORDER BY pk DESC LIMIT 1",
                tables.versions
            ),
            params![id, checksum],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    row.map(|(data, created, modified)| document_from_columns(&data, &created, &modified))
        .transpose()
}

/// Every version of `id`, oldest first.
pub(in crate::store) fn load_all_versions(
    conn: &Connection,
    tables: &Tables,
    id: &str,
) -> Result<Vec<Document>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data, created, modified FROM {} WHERE id=?1 ORDER BY pk ASC",
        tables.versions
    ))?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (data, created, modified) = row?;
        out.push(document_from_columns(&data, &created, &modified)?);
    }
    Ok(out)
}
