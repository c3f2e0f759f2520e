#![forbid(unsafe_code)]

use super::support::{dependencies_of, dependers_of, document_from_columns, to_sqlite_i64};
use super::{Dependency, PageRequest, Storage, StoreError};
use crate::query::{StorageRepresentation, translate_sort, translate_to_sql};
use ld_core::Document;
use rusqlite::params;
use serde_json::{Value, json};

const GRAPH_PATH: &str = "data->'$.\"@graph\"'";

/// A graph pattern in its single-value and list-value shapes.
fn either_shape(key: &str, value: Value) -> [String; 2] {
    [
        json!([{ key: value.clone() }]).to_string(),
        json!([{ key: [value] }]).to_string(),
    ]
}

impl Storage {
    /// Live documents linking to `iri` through `relation`.
    pub fn find_by_relation(
        &self,
        iri: &str,
        relation: &str,
        page: &PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        self.find_graph_match(either_shape(relation, json!({ "@id": iri })), page)
    }

    pub fn count_by_relation(&self, iri: &str, relation: &str) -> Result<usize, StoreError> {
        self.count_graph_match(either_shape(relation, json!({ "@id": iri })))
    }

    /// Live documents carrying the literal `value` under `relation`.
    pub fn find_by_value(
        &self,
        relation: &str,
        value: &str,
        page: &PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        self.find_graph_match(either_shape(relation, json!(value)), page)
    }

    pub fn count_by_value(&self, relation: &str, value: &str) -> Result<usize, StoreError> {
        self.count_graph_match(either_shape(relation, json!(value)))
    }

    /// Live documents quoting `iri` in an embedded graph.
    pub fn find_by_quotation(
        &self,
        iri: &str,
        page: &PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        self.find_graph_match(either_shape("@graph", json!({ "@id": iri })), page)
    }

    pub fn count_by_quotation(&self, iri: &str) -> Result<usize, StoreError> {
        self.count_graph_match(either_shape("@graph", json!({ "@id": iri })))
    }

    /// Live documents whose `key` holds `value` in the given representation,
    /// ordered by `sort` (comma separated, `-` for descending) then id.
    pub fn query(
        &self,
        key: &str,
        value: &str,
        representation: StorageRepresentation,
        sort: Option<&str>,
        page: &PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        let containment = translate_to_sql(key, value, representation)?;
        let order = match sort {
            Some(sort) => format!("{}, id ASC", translate_sort(sort, representation)?),
            None => "id ASC".to_string(),
        };

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT data, created, modified FROM {} \
             WHERE deleted=0 AND {} \
             ORDER BY {order} LIMIT ?2 OFFSET ?3",
            self.tables.main,
            containment.sql(),
        ))?;
        let mut rows = stmt.query(params![
            containment.param(),
            to_sqlite_i64(page.limit)?,
            to_sqlite_i64(page.offset)?,
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(document_from_columns(
                &row.get::<_, String>(0)?,
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
            )?);
        }
        Ok(out)
    }

    pub fn get_dependencies(&self, id: &str) -> Result<Vec<Dependency>, StoreError> {
        let conn = self.connection()?;
        dependencies_of(&conn, &self.tables, id)
    }

    pub fn get_dependers(&self, id: &str) -> Result<Vec<Dependency>, StoreError> {
        let conn = self.connection()?;
        dependers_of(&conn, &self.tables, id)
    }

    pub fn get_dependencies_of_type(
        &self,
        id: &str,
        relation: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .get_dependencies(id)?
            .into_iter()
            .filter(|dependency| dependency.relation == relation)
            .map(|dependency| dependency.id)
            .collect())
    }

    pub fn get_dependers_of_type(
        &self,
        id: &str,
        relation: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .get_dependers(id)?
            .into_iter()
            .filter(|depender| depender.relation == relation)
            .map(|depender| depender.id)
            .collect())
    }

    fn find_graph_match(
        &self,
        [single, list]: [String; 2],
        page: &PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT data, created, modified FROM {} \
             WHERE deleted=0 AND (json_contains({GRAPH_PATH}, ?1) OR json_contains({GRAPH_PATH}, ?2)) \
             ORDER BY id LIMIT ?3 OFFSET ?4",
            self.tables.main
        ))?;
        let mut rows = stmt.query(params![
            single,
            list,
            to_sqlite_i64(page.limit)?,
            to_sqlite_i64(page.offset)?,
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(document_from_columns(
                &row.get::<_, String>(0)?,
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
            )?);
        }
        Ok(out)
    }

    fn count_graph_match(&self, [single, list]: [String; 2]) -> Result<usize, StoreError> {
        let conn = self.connection()?;
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(1) FROM {} \
                 WHERE deleted=0 AND (json_contains({GRAPH_PATH}, ?1) OR json_contains({GRAPH_PATH}, ?2))",
                self.tables.main
            ),
            params![single, list],
            |row| row.get::<_, i64>(0),
        )?;
        usize::try_from(count).map_err(|_| StoreError::InvalidInput("numeric overflow"))
    }
}
