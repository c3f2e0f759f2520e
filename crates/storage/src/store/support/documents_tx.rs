#![forbid(unsafe_code)]

use super::super::StoreError;
use super::Tables;
use ld_core::{Document, timestamp};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use time::OffsetDateTime;

/// Column values of one main-table or version-table write.
pub(in crate::store) struct RowWrite<'a> {
    pub(in crate::store) data: String,
    pub(in crate::store) checksum: String,
    pub(in crate::store) collection: &'a str,
    pub(in crate::store) changed_in: &'a str,
    pub(in crate::store) changed_by: Option<&'a str>,
    pub(in crate::store) deleted: bool,
    pub(in crate::store) created: String,
    pub(in crate::store) modified: String,
}

impl<'a> RowWrite<'a> {
    pub(in crate::store) fn new(
        doc: &Document,
        collection: &'a str,
        changed_in: &'a str,
        changed_by: Option<&'a str>,
        created: OffsetDateTime,
        modified: OffsetDateTime,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            data: doc.to_json_string()?,
            checksum: doc.checksum(),
            collection,
            changed_in,
            changed_by,
            deleted: doc.deleted(),
            created: timestamp::format(created),
            modified: timestamp::format(modified),
        })
    }
}

/// The main row of a document, read under the transaction's write lock.
pub(in crate::store) struct LockedRow {
    pub(in crate::store) data: String,
    pub(in crate::store) collection: String,
    pub(in crate::store) checksum: String,
    pub(in crate::store) created: OffsetDateTime,
    pub(in crate::store) modified: OffsetDateTime,
}

impl LockedRow {
    pub(in crate::store) fn document(&self) -> Result<Document, StoreError> {
        let mut doc = Document::from_json_str(&self.data)?;
        doc.set_created(self.created);
        doc.set_modified(self.modified);
        Ok(doc)
    }
}

/// Reads the row of `id` inside an immediate transaction.
///
/// The transaction already holds the database write lock, so the row cannot
/// change until commit; a missing row cannot be locked.
pub(in crate::store) fn lock_row_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
) -> Result<LockedRow, StoreError> {
    let row = tx
        .query_row(
            &format!(
                "SELECT data, collection, checksum, created, modified FROM {} WHERE id=?1",
                tables.main
            ),
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((data, collection, checksum, created, modified)) = row else {
        return Err(StoreError::AcquireLock { id: id.to_string() });
    };
    Ok(LockedRow {
        data,
        collection,
        checksum,
        created: parse_stamp(&created)?,
        modified: parse_stamp(&modified)?,
    })
}

pub(in crate::store) fn parse_stamp(value: &str) -> Result<OffsetDateTime, StoreError> {
    timestamp::parse(value).ok_or(StoreError::InvalidInput("unparseable timestamp in row"))
}

pub(in crate::store) fn insert_main_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
    row: &RowWrite<'_>,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        &format!(
            "INSERT INTO {}(id, data, collection, changed_in, changed_by, checksum, deleted, created, modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            tables.main
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
    Ok(())
}

pub(in crate::store) fn update_main_tx(
    tx: &Transaction<'_>,
    tables: &Tables,
    id: &str,
    row: &RowWrite<'_>,
) -> Result<(), StoreError> {
    tx.execute(
        &format!(
            "UPDATE {} SET data=?2, collection=?3, changed_in=?4, changed_by=?5, checksum=?6, \
             deleted=?7, created=?8, modified=?9 WHERE id=?1",
            tables.main
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
    Ok(())
}

/// Timestamps as stored, for handing back to the caller's document.
pub(in crate::store) fn row_timestamps(
    conn: &Connection,
    tables: &Tables,
    id: &str,
) -> Result<(OffsetDateTime, OffsetDateTime), StoreError> {
    let (created, modified) = conn
        .query_row(
            &format!("SELECT created, modified FROM {} WHERE id=?1", tables.main),
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
        .ok_or(StoreError::UnknownId)?;
    Ok((parse_stamp(&created)?, parse_stamp(&modified)?))
}

/// Builds a document from stored columns; the columns win over the json.
pub(in crate::store) fn document_from_columns(
    data: &str,
    created: &str,
    modified: &str,
) -> Result<Document, StoreError> {
    let mut doc = Document::from_json_str(data)?;
    doc.set_created(parse_stamp(created)?);
    doc.set_modified(parse_stamp(modified)?);
    Ok(doc)
}

pub(in crate::store) fn load_document(
    conn: &Connection,
    tables: &Tables,
    id: &str,
) -> Result<Option<Document>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT data, created, modified FROM {} WHERE id=?1", tables.main),
            params![id],
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

pub(in crate::store) fn map_insert_conflict(err: rusqlite::Error, duplicate: &str) -> StoreError {
    if is_constraint_violation(&err) {
        tracing::info!(duplicate, "create failed on duplicate identifier");
        return StoreError::CreateFailed {
            duplicate: duplicate.to_string(),
        };
    }
    StoreError::Sql(err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

pub(in crate::store) fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}
