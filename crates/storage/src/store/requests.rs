#![forbid(unsafe_code)]

use time::OffsetDateTime;

pub const HOLDING_COLLECTION: &str = "hold";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    pub collection: String,
    pub changed_in: String,
    pub changed_by: Option<String>,
    pub minor_update: bool,
    pub deleted: bool,
}

impl StoreRequest {
    pub fn new(collection: impl Into<String>, changed_in: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            changed_in: changed_in.into(),
            changed_by: None,
            minor_update: false,
            deleted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub changed_in: String,
    pub changed_by: Option<String>,
    pub minor_update: bool,
}

impl UpdateRequest {
    pub fn new(changed_in: impl Into<String>) -> Self {
        Self {
            changed_in: changed_in.into(),
            changed_by: None,
            minor_update: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LoadAllRequest {
    pub collection: Option<String>,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

/// Where an IRI sits among a document's identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdType {
    pub graph_index: i64,
    pub is_main: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DocumentStatus {
    pub exists: bool,
    pub main_id: Option<String>,
    pub deleted: bool,
    pub graph_index: Option<i64>,
}

/// One edge of the dependency table seen from either end.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dependency {
    pub relation: String,
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModifiedWindow {
    pub min: OffsetDateTime,
    pub max: OffsetDateTime,
}
