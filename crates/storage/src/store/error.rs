#![forbid(unsafe_code)]

use crate::pool::PoolError;
use ld_core::{DocumentError, FramingError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unknown id")]
    UnknownId,
    #[error("create failed, duplicate identifier: {duplicate}")]
    CreateFailed { duplicate: String },
    #[error("unable to lock row {id}: no such document")]
    AcquireLock { id: String },
    #[error("conflicting holding for {bib} held by {held_by}")]
    ConflictingHold { bib: String, held_by: String },
    #[error("holding target not found: {iri}")]
    HoldingTargetNotFound { iri: String },
    #[error("remove is unsupported while versioning is disabled")]
    RemoveUnsupported,
    #[error("update callback failed: {0}")]
    Callback(String),
    #[error("framing: {0}")]
    Framing(#[from] FramingError),
    #[error("document: {0}")]
    Document(#[from] DocumentError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQL",
            Self::Json(_) => "JSON",
            Self::Pool(PoolError::NestingTooDeep { .. }) => "NESTING_TOO_DEEP",
            Self::Pool(_) => "POOL",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnknownId => "UNKNOWN_ID",
            Self::CreateFailed { .. } => "CREATE_FAILED",
            Self::AcquireLock { .. } => "ACQUIRE_LOCK",
            Self::ConflictingHold { .. } => "CONFLICTING_HOLD",
            Self::HoldingTargetNotFound { .. } => "HOLDING_TARGET_NOT_FOUND",
            Self::RemoveUnsupported => "REMOVE_UNSUPPORTED",
            Self::Callback(_) => "CALLBACK",
            Self::Framing(_) => "FRAMING",
            Self::Document(_) => "DOCUMENT",
        }
    }
}
