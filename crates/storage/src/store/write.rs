#![forbid(unsafe_code)]

use super::support::{
    RowWrite, check_holding_tx, delete_dependencies_tx, insert_main_tx, insert_version_tx,
    lock_row_tx, map_insert_conflict, propagate_to_dependers_tx, refresh_dependencies_tx,
    refresh_identifiers_tx, refresh_modified_window_tx, row_timestamps, update_main_tx,
};
use super::{HOLDING_COLLECTION, Storage, StoreError, StoreRequest, UpdateRequest};
use ld_core::{Document, timestamp};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::convert::Infallible;
use std::fmt::Display;

impl Storage {
    /// Inserts a new document.
    ///
    /// On success the caller's document carries the stored `created` and
    /// `modified` stamps; on failure it is left untouched.
    pub fn store(&self, doc: &mut Document, request: &StoreRequest) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (id, stored) = self.store_tx(&tx, doc.clone(), request)?;
        tx.commit()?;

        *doc = stored;
        self.reload_timestamps(&conn, &id, doc)?;
        tracing::debug!(id = %id, collection = %request.collection, "stored document");
        Ok(())
    }

    /// [`Storage::store`] with the boolean outcome: a holding whose target
    /// bib does not exist yields `Ok(false)`, every other failure is an error.
    pub fn create_document(
        &self,
        doc: &mut Document,
        request: &StoreRequest,
    ) -> Result<bool, StoreError> {
        match self.store(doc, request) {
            Ok(()) => Ok(true),
            Err(StoreError::HoldingTargetNotFound { iri }) => {
                tracing::info!(target_iri = %iri, "holding target not found, document not created");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Stores every document in one transaction; nothing is written, and no
    /// input document changes, if any of them fails.
    pub fn bulk_store(
        &self,
        docs: &mut [Document],
        request: &StoreRequest,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            stored.push(self.store_tx(&tx, doc.clone(), request)?);
        }
        tx.commit()?;

        for (doc, (id, stored)) in docs.iter_mut().zip(stored) {
            *doc = stored;
            self.reload_timestamps(&conn, &id, doc)?;
        }
        tracing::debug!(count = docs.len(), collection = %request.collection, "bulk stored documents");
        Ok(())
    }

    /// Loads `id` under the write lock, lets `update` edit it and writes the
    /// result back. Returns the document as stored.
    pub fn store_atomic_update<F, E>(
        &self,
        id: &str,
        request: &UpdateRequest,
        update: F,
    ) -> Result<Document, StoreError>
    where
        F: FnOnce(&mut Document) -> Result<(), E>,
        E: Display,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let doc = self.update_tx(&tx, id, request, update)?;
        tx.commit()?;

        tracing::debug!(id, minor = request.minor_update, "updated document");
        Ok(doc)
    }

    /// Marks `id` deleted. The row, its versions and its identifiers stay;
    /// its outbound dependencies are dropped.
    pub fn remove(&self, id: &str, request: &UpdateRequest) -> Result<Document, StoreError> {
        if !self.versioning {
            return Err(StoreError::RemoveUnsupported);
        }
        let doc = self.store_atomic_update(id, request, |doc| {
            doc.set_deleted(true);
            Ok::<(), Infallible>(())
        })?;
        tracing::debug!(id, "removed document");
        Ok(doc)
    }

    /// Writes `doc` and everything derived from it. Returns the system id
    /// and the document as stamped for storage.
    fn store_tx(
        &self,
        tx: &Transaction<'_>,
        mut doc: Document,
        request: &StoreRequest,
    ) -> Result<(String, Document), StoreError> {
        doc.validate()?;
        let id = self.system_id_of(&doc)?;
        if request.deleted {
            doc.set_deleted(true);
        }

        if request.collection == HOLDING_COLLECTION && !doc.deleted() {
            check_holding_tx(tx, &self.tables, &self.base_uri, &doc, &id)?;
        }

        // minor imports keep the stamps they arrive with
        let now = timestamp::now();
        let (created, modified) = match (request.minor_update, doc.created(), doc.modified()) {
            (true, Some(created), Some(modified)) => (created, modified),
            _ => (now, now),
        };
        doc.set_created(created);
        doc.set_modified(modified);

        let row = RowWrite::new(
            &doc,
            &request.collection,
            &request.changed_in,
            request.changed_by.as_deref(),
            created,
            modified,
        )?;
        if let Err(err) = insert_main_tx(tx, &self.tables, &id, &row) {
            let duplicate = doc
                .complete_id(&self.base_uri)
                .unwrap_or_else(|| id.clone());
            return Err(map_insert_conflict(err, &duplicate));
        }
        if self.versioning {
            insert_version_tx(tx, &self.tables, &id, &row)?;
        }
        self.refresh_derived_tx(tx, &id, &doc)?;
        Ok((id, doc))
    }

    fn update_tx<F, E>(
        &self,
        tx: &Transaction<'_>,
        id: &str,
        request: &UpdateRequest,
        update: F,
    ) -> Result<Document, StoreError>
    where
        F: FnOnce(&mut Document) -> Result<(), E>,
        E: Display,
    {
        let locked = lock_row_tx(tx, &self.tables, id)?;
        let mut doc = locked.document()?;
        let was_deleted = doc.deleted();
        let holding_before = (
            doc.holding_for().map(str::to_string),
            doc.held_by().map(str::to_string),
        );

        update(&mut doc).map_err(|err| StoreError::Callback(err.to_string()))?;
        doc.validate()?;
        if self.system_id_of(&doc)? != id {
            return Err(StoreError::InvalidInput("update changed the record id"));
        }

        // unchanged content keeps its stamp so that status and checksum hold still
        let unchanged = doc.checksum() == locked.checksum;
        let modified = if request.minor_update || unchanged {
            locked.modified
        } else {
            timestamp::after(Some(locked.modified))
        };
        doc.set_created(locked.created);
        doc.set_modified(modified);

        let holding_after = (
            doc.holding_for().map(str::to_string),
            doc.held_by().map(str::to_string),
        );
        if locked.collection == HOLDING_COLLECTION
            && !doc.deleted()
            && (was_deleted || holding_before != holding_after)
        {
            check_holding_tx(tx, &self.tables, &self.base_uri, &doc, id)?;
        }

        let row = RowWrite::new(
            &doc,
            &locked.collection,
            &request.changed_in,
            request.changed_by.as_deref(),
            locked.created,
            modified,
        )?;
        update_main_tx(tx, &self.tables, id, &row)?;
        if self.versioning {
            insert_version_tx(tx, &self.tables, id, &row)?;
        }
        self.refresh_derived_tx(tx, id, &doc)?;
        Ok(doc)
    }

    /// Identifiers, dependency edges and cached modified windows of `id` and
    /// everything depending on it.
    fn refresh_derived_tx(
        &self,
        tx: &Transaction<'_>,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        refresh_identifiers_tx(tx, &self.tables, &self.base_uri, id, doc)?;
        if doc.deleted() {
            delete_dependencies_tx(tx, &self.tables, id)?;
        } else {
            refresh_dependencies_tx(tx, &self.tables, &self.base_uri, id, doc)?;
        }
        refresh_modified_window_tx(tx, &self.tables, id)?;
        let refreshed = propagate_to_dependers_tx(tx, &self.tables, id)?;
        if refreshed > 0 {
            tracing::debug!(id, refreshed, "refreshed dependers' modified windows");
        }
        Ok(())
    }

    fn reload_timestamps(
        &self,
        conn: &Connection,
        id: &str,
        doc: &mut Document,
    ) -> Result<(), StoreError> {
        let (created, modified) = row_timestamps(conn, &self.tables, id)?;
        doc.set_created(created);
        doc.set_modified(modified);
        Ok(())
    }
}
