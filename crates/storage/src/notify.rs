#![forbid(unsafe_code)]

//! Hand-off to a search index after a write.
//!
//! The indexer itself lives elsewhere; storage only decides which documents
//! need re-indexing because something they link to changed.

use crate::store::{Storage, StoreError};
use ld_core::Document;

/// Above this many dependers the re-index is left to a background job.
pub const REINDEX_SYNC_LIMIT: usize = 20;

const ITEM_OF: &str = "itemOf";

pub trait IndexSink {
    fn index(&self, doc: &Document, collection: &str);
    fn reindex_dependers(&self, ids: &[String]);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReindexPlan {
    /// Already forwarded to the sink.
    Sync(Vec<String>),
    /// Too many to do inline; the caller schedules these.
    Background(Vec<String>),
}

impl Storage {
    /// Dependers whose index entries embed `id`. Holdings are indexed on
    /// their own and are left out.
    pub fn dependers_for_reindex(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .get_dependers(id)?
            .into_iter()
            .filter(|depender| depender.relation != ITEM_OF)
            .map(|depender| depender.id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Indexes `doc` and forwards its dependers to the sink when there are
    /// few enough of them.
    pub fn notify(
        &self,
        sink: &dyn IndexSink,
        doc: &Document,
        collection: &str,
    ) -> Result<ReindexPlan, StoreError> {
        sink.index(doc, collection);
        let id = self.system_id_of(doc)?;
        let dependers = self.dependers_for_reindex(&id)?;
        if dependers.len() < REINDEX_SYNC_LIMIT {
            sink.reindex_dependers(&dependers);
            return Ok(ReindexPlan::Sync(dependers));
        }
        tracing::info!(id = %id, count = dependers.len(), "deferring re-index of dependers");
        Ok(ReindexPlan::Background(dependers))
    }
}
