#![forbid(unsafe_code)]

mod error;
mod find;
mod read;
mod requests;
mod settings;
mod stream;
mod support;
mod write;

pub use error::StoreError;
pub use requests::*;
pub use stream::DocumentStream;

use crate::config::StoreConfig;
use crate::pool::{ConnectionPool, PoolMetrics, PooledConnection};
use ld_core::{BaseUri, Document};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use support::{Tables, install_schema};

/// Document storage over one SQLite database file.
///
/// Every write path runs in one IMMEDIATE transaction on a pooled
/// connection; the database write lock taken at transaction start is what
/// serializes writers to the same row and holdings on the same bib.
#[derive(Debug)]
pub struct Storage {
    pool: Arc<ConnectionPool>,
    tables: Tables,
    base_uri: BaseUri,
    versioning: bool,
    storage_dir: PathBuf,
}

impl Storage {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        std::fs::create_dir_all(&config.storage_dir)?;

        let pool = ConnectionPool::open(config.db_path(), &config.pool, config.busy_timeout())?;
        let tables = Tables::new(&config.base_table);
        {
            let conn = pool.acquire()?;
            install_schema(&conn, &tables)?;
        }

        tracing::debug!(
            db = %config.db_path().display(),
            base_table = %config.base_table,
            versioning = config.versioning,
            "storage opened"
        );
        Ok(Self {
            pool,
            tables,
            base_uri: config.parsed_base_uri()?,
            versioning: config.versioning,
            storage_dir: config.storage_dir.clone(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn base_uri(&self) -> &BaseUri {
        &self.base_uri
    }

    pub fn versioning(&self) -> bool {
        self.versioning
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    /// The system id of a document: its record id relative to the base uri.
    pub fn system_id_of(&self, doc: &Document) -> Result<String, StoreError> {
        let Some(id) = doc.short_id(&self.base_uri) else {
            return Err(StoreError::InvalidInput("record id is not under the base uri"));
        };
        if id.is_empty() || id.contains(['/', '#', '?']) {
            return Err(StoreError::InvalidInput("record id is not a system id"));
        }
        Ok(id)
    }

    fn connection(&self) -> Result<PooledConnection, StoreError> {
        Ok(self.pool.acquire()?)
    }
}
