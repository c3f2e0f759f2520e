#![forbid(unsafe_code)]

use super::support::{document_from_columns, to_sqlite_i64};
use super::{LoadAllRequest, Storage, StoreError};
use crate::pool::PooledConnection;
use ld_core::{Document, timestamp};
use rusqlite::params;
use std::collections::VecDeque;

const FETCH_SIZE: usize = 100;

impl Storage {
    /// Streams live documents in `(modified, id)` order.
    ///
    /// `since` and `until` bound `modified` inclusively. The stream keeps one
    /// pooled connection and one read transaction until it is exhausted or
    /// dropped, so it sees a single snapshot.
    pub fn load_all(&self, request: &LoadAllRequest) -> Result<DocumentStream, StoreError> {
        let conn = self.connection()?;
        conn.execute_batch("BEGIN")?;
        Ok(DocumentStream {
            conn: Some(conn),
            sql: format!(
                "SELECT id, data, created, modified FROM {} \
                 WHERE deleted=0 \
                   AND (?1 IS NULL OR collection=?1) \
                   AND (?2 IS NULL OR modified >= ?2) \
                   AND (?3 IS NULL OR modified <= ?3) \
                   AND (?4 IS NULL OR modified > ?4 OR (modified = ?4 AND id > ?5)) \
                 ORDER BY modified ASC, id ASC LIMIT ?6",
                self.tables.main
            ),
            collection: request.collection.clone(),
            since: request.since.map(timestamp::format),
            until: request.until.map(timestamp::format),
            cursor: None,
            buffer: VecDeque::new(),
        })
    }
}

/// Lazily paged documents over a held connection.
pub struct DocumentStream {
    conn: Option<PooledConnection>,
    sql: String,
    collection: Option<String>,
    since: Option<String>,
    until: Option<String>,
    cursor: Option<(String, String)>,
    buffer: VecDeque<(String, String, String)>,
}

impl DocumentStream {
    fn fetch(&mut self) -> Result<(), StoreError> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };
        let (after_modified, after_id) = match &self.cursor {
            Some((modified, id)) => (Some(modified.as_str()), Some(id.as_str())),
            None => (None, None),
        };

        let mut stmt = conn.prepare_cached(&self.sql)?;
        let mut rows = stmt.query(params![
            self.collection,
            self.since,
            self.until,
            after_modified,
            after_id,
            to_sqlite_i64(FETCH_SIZE)?,
        ])?;
        let mut last = None;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let modified: String = row.get(3)?;
            last = Some((modified.clone(), id));
            self.buffer
                .push_back((row.get(1)?, row.get(2)?, modified));
        }
        drop(rows);
        drop(stmt);

        match last {
            Some(last) if self.buffer.len() == FETCH_SIZE => self.cursor = Some(last),
            _ => self.finish(),
        }
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("closing document stream failed: {err}");
            }
        }
    }
}

impl Iterator for DocumentStream {
    type Item = Result<Document, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            if let Err(err) = self.fetch() {
                self.finish();
                return Some(Err(err));
            }
        }
        let (data, created, modified) = self.buffer.pop_front()?;
        Some(document_from_columns(&data, &created, &modified))
    }
}

impl Drop for DocumentStream {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStream")
            .field("open", &self.conn.is_some())
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
