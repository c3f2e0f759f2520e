#![forbid(unsafe_code)]

//! A record/thing pair in flat `@graph` form.
//!
//! Element 0 of the graph is the record, element 1 (when present) the thing
//! it describes. Every accessor goes through a structural [`Path`]; writes
//! that meet the wrong container kind are logged and skipped.

mod status;

pub use status::RecordStatus;

use crate::ids::{BaseUri, is_absolute};
use crate::jsonld::{
    CREATED_KEY, GRAPH_KEY, ID_KEY, MODIFIED_KEY, SAME_AS_KEY, TYPE_KEY, node_id, reference,
    references,
};
use crate::path::{self, Path, PathError};
use crate::timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use time::OffsetDateTime;

const RECORD: usize = 0;
const THING: usize = 1;

const MAIN_ENTITY_KEY: &str = "mainEntity";
const RECORD_STATUS_KEY: &str = "recordStatus";
const CONTROL_NUMBER_KEY: &str = "controlNumber";
const ENCODING_LEVEL_KEY: &str = "encodingLevel";
const IDENTIFIED_BY_KEY: &str = "identifiedBy";
const ITEM_OF_KEY: &str = "itemOf";
const HELD_BY_KEY: &str = "heldBy";
const VALUE_KEY: &str = "value";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("document failed validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("malformed document json: {0}")]
    Json(#[from] serde_json::Error),
}

/// An `identifiedBy` entry: `{"@type": kind, "value": value}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypedIdentifier {
    pub kind: String,
    pub value: String,
}

/// An outbound link from the described resource to another document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub relation: String,
    pub iri: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    data: Value,
}

fn node_path(index: usize, key: &str) -> Path {
    crate::path![GRAPH_KEY, index, key]
}

fn node_link_path(index: usize, key: &str) -> Path {
    crate::path![GRAPH_KEY, index, key, ID_KEY]
}

impl Document {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// A minimal record `<base><system_id>` describing the thing `<base><system_id>#it`.
    pub fn new_record(base: &BaseUri, system_id: &str) -> Self {
        let record_id = base.resolve(system_id);
        let thing_id = format!("{record_id}#it");
        Self::new(json!({
            GRAPH_KEY: [
                {ID_KEY: record_id, MAIN_ENTITY_KEY: {ID_KEY: thing_id}},
                {ID_KEY: thing_id}
            ]
        }))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DocumentError> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(&self.data)?)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Value {
        &mut self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }

    pub fn get(&self, path: &Path) -> Option<&Value> {
        path::get(&self.data, path)
    }

    pub fn set(&mut self, path: &Path, value: Value) -> Result<(), PathError> {
        path::set(&mut self.data, path, value)
    }

    fn get_str(&self, path: &Path) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    fn put(&mut self, path: &Path, value: Value) {
        if let Err(err) = self.set(path, value) {
            tracing::warn!(path = %path, "document write skipped: {err}");
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        self.get_str(&node_path(RECORD, ID_KEY))
    }

    pub fn set_record_id(&mut self, id: &str) {
        self.put(&node_path(RECORD, ID_KEY), Value::String(id.to_string()));
    }

    pub fn thing_id(&self) -> Option<&str> {
        self.get_str(&node_path(THING, ID_KEY))
    }

    /// Also points the record's `mainEntity` at the new id.
    pub fn set_thing_id(&mut self, id: &str) {
        self.put(&node_path(THING, ID_KEY), Value::String(id.to_string()));
        self.put(&node_path(RECORD, MAIN_ENTITY_KEY), reference(id));
    }

    /// The record id relative to `base`; relative ids lose their leading slash.
    pub fn short_id(&self, base: &BaseUri) -> Option<String> {
        let id = self.record_id()?;
        if !is_absolute(id) {
            return Some(id.trim_start_matches('/').to_string());
        }
        base.relativize(id).map(str::to_string)
    }

    pub fn complete_id(&self, base: &BaseUri) -> Option<String> {
        self.record_id().map(|id| base.resolve(id))
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.get_str(&node_path(RECORD, CREATED_KEY))
            .and_then(timestamp::parse)
    }

    pub fn set_created(&mut self, at: OffsetDateTime) {
        self.put(
            &node_path(RECORD, CREATED_KEY),
            Value::String(timestamp::format(at)),
        );
        self.refresh_status();
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.get_str(&node_path(RECORD, MODIFIED_KEY))
            .and_then(timestamp::parse)
    }

    pub fn set_modified(&mut self, at: OffsetDateTime) {
        self.put(
            &node_path(RECORD, MODIFIED_KEY),
            Value::String(timestamp::format(at)),
        );
        self.refresh_status();
    }

    pub fn record_status(&self) -> Option<RecordStatus> {
        self.get_str(&node_path(RECORD, RECORD_STATUS_KEY))
            .and_then(RecordStatus::parse)
    }

    pub fn set_record_status(&mut self, status: RecordStatus) {
        self.put(
            &node_path(RECORD, RECORD_STATUS_KEY),
            Value::String(status.as_str().to_string()),
        );
    }

    pub fn deleted(&self) -> bool {
        self.record_status() == Some(RecordStatus::Deleted)
    }

    /// Un-deleting resets the status to new and lets the timestamps move it on.
    pub fn set_deleted(&mut self, deleted: bool) {
        if deleted {
            self.set_record_status(RecordStatus::Deleted);
        } else if self.deleted() {
            self.set_record_status(RecordStatus::New);
            self.refresh_status();
        }
    }

    // new -> corrected once modified moves away from created; other states stay
    fn refresh_status(&mut self) {
        let (Some(created), Some(modified)) = (self.created(), self.modified()) else {
            return;
        };
        let current = self
            .get_str(&node_path(RECORD, RECORD_STATUS_KEY))
            .map(RecordStatus::parse);
        let next = match current {
            None | Some(Some(RecordStatus::New)) => {
                if created == modified {
                    RecordStatus::New
                } else {
                    RecordStatus::CorrectedOrRevised
                }
            }
            _ => return,
        };
        self.set_record_status(next);
    }

    pub fn control_number(&self) -> Option<&str> {
        self.get_str(&node_path(RECORD, CONTROL_NUMBER_KEY))
    }

    pub fn set_control_number(&mut self, value: &str) {
        self.put(
            &node_path(RECORD, CONTROL_NUMBER_KEY),
            Value::String(value.to_string()),
        );
    }

    pub fn encoding_level(&self) -> Option<&str> {
        self.get_str(&node_path(RECORD, ENCODING_LEVEL_KEY))
    }

    pub fn record_type(&self) -> Option<&str> {
        self.get_str(&node_path(RECORD, TYPE_KEY))
    }

    pub fn thing_type(&self) -> Option<&str> {
        self.get_str(&node_path(THING, TYPE_KEY))
    }

    /// The bib record a holding is an item of.
    pub fn holding_for(&self) -> Option<&str> {
        self.get_str(&node_link_path(THING, ITEM_OF_KEY))
    }

    pub fn set_holding_for(&mut self, iri: &str) {
        self.put(&node_path(THING, ITEM_OF_KEY), reference(iri));
    }

    /// The organization (sigel) owning a holding.
    pub fn held_by(&self) -> Option<&str> {
        self.get_str(&node_link_path(THING, HELD_BY_KEY))
    }

    pub fn set_held_by(&mut self, iri: &str) {
        self.put(&node_path(THING, HELD_BY_KEY), reference(iri));
    }

    /// Main id first, then the `sameAs` aliases.
    pub fn record_identifiers(&self) -> Vec<String> {
        self.identifiers(RECORD)
    }

    pub fn thing_identifiers(&self) -> Vec<String> {
        self.identifiers(THING)
    }

    pub fn add_record_identifier(&mut self, iri: &str) -> Result<(), DocumentError> {
        self.add_identifier(RECORD, iri)
    }

    pub fn add_thing_identifier(&mut self, iri: &str) -> Result<(), DocumentError> {
        self.add_identifier(THING, iri)
    }

    fn identifiers(&self, index: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if let Some(id) = self.get_str(&node_path(index, ID_KEY)) {
            out.push(id.to_string());
        }
        let aliases = self.get(&node_path(index, SAME_AS_KEY));
        for alias in aliases.into_iter().flat_map(link_ids) {
            if !out.iter().any(|known| known == alias) {
                out.push(alias.to_string());
            }
        }
        out
    }

    fn add_identifier(&mut self, index: usize, iri: &str) -> Result<(), DocumentError> {
        let iri = iri.trim();
        if iri.is_empty() {
            return Err(DocumentError::InvalidArgument("identifier must not be blank"));
        }
        if self.identifiers(index).iter().any(|known| known == iri) {
            return Ok(());
        }
        self.append(&node_path(index, SAME_AS_KEY), reference(iri))
    }

    pub fn typed_record_identifiers(&self) -> Vec<TypedIdentifier> {
        self.typed_identifiers(RECORD)
    }

    pub fn typed_thing_identifiers(&self) -> Vec<TypedIdentifier> {
        self.typed_identifiers(THING)
    }

    pub fn add_typed_thing_identifier(
        &mut self,
        kind: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        if kind.trim().is_empty() || value.trim().is_empty() {
            return Err(DocumentError::InvalidArgument(
                "typed identifier needs a type and a value",
            ));
        }
        let candidate = TypedIdentifier {
            kind: kind.to_string(),
            value: value.to_string(),
        };
        if self.typed_thing_identifiers().contains(&candidate) {
            return Ok(());
        }
        self.append(
            &node_path(THING, IDENTIFIED_BY_KEY),
            json!({TYPE_KEY: kind, VALUE_KEY: value}),
        )
    }

    fn typed_identifiers(&self, index: usize) -> Vec<TypedIdentifier> {
        let Some(Value::Array(entries)) = self.get(&node_path(index, IDENTIFIED_BY_KEY)) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                Some(TypedIdentifier {
                    kind: entry.get(TYPE_KEY)?.as_str()?.to_string(),
                    value: entry.get(VALUE_KEY)?.as_str()?.to_string(),
                })
            })
            .collect()
    }

    // a single object at `target` is promoted to a one-element list first
    fn append(&mut self, target: &Path, entry: Value) -> Result<(), DocumentError> {
        let mut entries = match path::remove(&mut self.data, target)? {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        entries.push(entry);
        self.set(target, Value::Array(entries))?;
        Ok(())
    }

    /// Structural checksum of the whole graph, audit timestamps excluded.
    pub fn checksum(&self) -> String {
        crate::checksum::checksum(&self.data).to_string()
    }

    /// Links from the thing (and later graph nodes) to resources outside
    /// this document. Quoted sub-graphs and `sameAs` aliases are skipped.
    pub fn external_refs(&self) -> Vec<Link> {
        let Some(Value::Array(graph)) = self.data.get(GRAPH_KEY) else {
            return Vec::new();
        };

        let mut internal: BTreeSet<String> = graph
            .iter()
            .filter_map(node_id)
            .map(str::to_string)
            .collect();
        internal.extend(self.record_identifiers());
        internal.extend(self.thing_identifiers());

        let mut links = BTreeSet::new();
        for node in graph.iter().skip(THING) {
            if node.get(GRAPH_KEY).is_some() {
                continue;
            }
            for (relation, iri) in references(node) {
                if relation == SAME_AS_KEY || iri.starts_with("_:") || internal.contains(&iri) {
                    continue;
                }
                links.insert(Link { relation, iri });
            }
        }
        links.into_iter().collect()
    }

    /// Shape check for a storable record.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let Some(Value::Array(graph)) = self.data.get(GRAPH_KEY) else {
            return Err(DocumentError::Validation(
                "document has no @graph list".to_string(),
            ));
        };
        let Some(record) = graph.first() else {
            return Err(DocumentError::Validation("@graph is empty".to_string()));
        };
        if node_id(record).is_none() {
            return Err(DocumentError::Validation("record has no @id".to_string()));
        }

        if let Some(thing) = graph.get(THING) {
            let Some(thing_id) = node_id(thing) else {
                return Err(DocumentError::Validation("thing has no @id".to_string()));
            };
            if let Some(main_entity) = self.get_str(&node_link_path(RECORD, MAIN_ENTITY_KEY)) {
                if main_entity != thing_id {
                    return Err(DocumentError::Validation(format!(
                        "mainEntity {main_entity} does not match thing {thing_id}"
                    )));
                }
            }
        }

        if let Some(raw) = self.get_str(&node_path(RECORD, RECORD_STATUS_KEY)) {
            if RecordStatus::parse(raw).is_none() {
                return Err(DocumentError::Validation(format!(
                    "unknown record status {raw}"
                )));
            }
        }
        Ok(())
    }
}

fn link_ids(value: &Value) -> Vec<&str> {
    match value {
        Value::Array(items) => items.iter().filter_map(node_id).collect(),
        other => node_id(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests;
