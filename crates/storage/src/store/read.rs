#![forbid(unsafe_code)]

use super::support::{
    holdings_of_bib, id_type_by_iri, load_all_versions, load_document, load_version,
    main_iri_for, parse_stamp, system_id_by_iri,
};
use super::{DocumentStatus, IdType, ModifiedWindow, Storage, StoreError};
use ld_core::Document;
use ld_core::jsonld;
use rusqlite::{OptionalExtension, params, params_from_iter};
use serde_json::Value;

impl Storage {
    /// The current state of `id`, deleted documents included.
    pub fn load(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.connection()?;
        load_document(&conn, &self.tables, id)
    }

    pub fn load_version(&self, id: &str, checksum: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.connection()?;
        load_version(&conn, &self.tables, id, checksum)
    }

    /// Every recorded version of `id`, oldest first.
    pub fn load_all_versions(&self, id: &str) -> Result<Vec<Document>, StoreError> {
        let conn = self.connection()?;
        load_all_versions(&conn, &self.tables, id)
    }

    /// Loads the document whose main record or thing id is `iri`.
    pub fn load_by_main_id(&self, iri: &str) -> Result<Option<Document>, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        match id_type_by_iri(&conn, &self.tables, iri)? {
            Some(IdType { is_main: true, .. }) => {}
            _ => return Ok(None),
        }
        let Some(id) = system_id_by_iri(&conn, &self.tables, iri)? else {
            return Ok(None);
        };
        load_document(&conn, &self.tables, &id)
    }

    /// Loads the document answering to `iri`, main id or alias.
    pub fn load_document_by_iri(&self, iri: &str) -> Result<Option<Document>, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        let Some(id) = system_id_by_iri(&conn, &self.tables, iri)? else {
            return Ok(None);
        };
        load_document(&conn, &self.tables, &id)
    }

    /// The document of `id` framed around its record.
    pub fn load_framed(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let Some(doc) = self.load(id)? else {
            return Ok(None);
        };
        let main_id = doc
            .complete_id(&self.base_uri)
            .unwrap_or_else(|| self.base_uri.resolve(id));
        Ok(Some(jsonld::frame(&main_id, doc.data())?))
    }

    pub fn get_system_id_by_iri(&self, iri: &str) -> Result<Option<String>, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        system_id_by_iri(&conn, &self.tables, iri)
    }

    /// The main iri standing for `iri`, which may be an alias.
    pub fn get_main_id(&self, iri: &str) -> Result<Option<String>, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        main_iri_for(&conn, &self.tables, iri)
    }

    pub fn get_id_type(&self, iri: &str) -> Result<Option<IdType>, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        id_type_by_iri(&conn, &self.tables, iri)
    }

    pub fn status(&self, iri: &str) -> Result<DocumentStatus, StoreError> {
        let iri = &self.base_uri.resolve(iri);
        let conn = self.connection()?;
        let Some(id) = system_id_by_iri(&conn, &self.tables, iri)? else {
            return Ok(DocumentStatus::default());
        };
        let id_type = id_type_by_iri(&conn, &self.tables, iri)?;
        let deleted = conn
            .query_row(
                &format!("SELECT deleted FROM {} WHERE id=?1", self.tables.main),
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        let Some(deleted) = deleted else {
            return Ok(DocumentStatus::default());
        };

        Ok(DocumentStatus {
            exists: true,
            main_id: main_iri_for(&conn, &self.tables, iri)?,
            deleted,
            graph_index: id_type.map(|id_type| id_type.graph_index),
        })
    }

    pub fn get_collection_by_system_id(&self, id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connection()?;
        Ok(conn
            .query_row(
                &format!("SELECT collection FROM {} WHERE id=?1", self.tables.main),
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    /// System id of the live holding on `bib_iri` held by `library`.
    pub fn get_holding_for_bib_and_sigel(
        &self,
        bib_iri: &str,
        library: &str,
    ) -> Result<Option<String>, StoreError> {
        let bib_iri = self.base_uri.resolve(bib_iri);
        let conn = self.connection()?;
        let Some(bib) = system_id_by_iri(&conn, &self.tables, &bib_iri)? else {
            return Ok(None);
        };
        Ok(holdings_of_bib(&conn, &self.tables, &bib)?
            .into_iter()
            .find(|(_, holding)| holding.held_by() == Some(library))
            .map(|(id, _)| id))
    }

    /// Oldest and newest modification across `ids` and everything they
    /// depend on. Unknown ids are ignored; `None` if none is known.
    pub fn get_min_max_modified<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<Option<ModifiedWindow>, StoreError> {
        if ids.is_empty() {
            return Ok(None);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.connection()?;
        let window = conn.query_row(
            &format!(
                "SELECT MIN(COALESCE(dep_min_modified, modified)), \
                        MAX(COALESCE(dep_max_modified, modified)) \
                 FROM {} WHERE id IN ({placeholders})",
                self.tables.main
            ),
            params_from_iter(ids.iter().map(|id| id.as_ref())),
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            },
        )?;
        window_from_stamps(window)
    }

    /// The cached window of `id` alone.
    pub fn dependency_window(&self, id: &str) -> Result<Option<ModifiedWindow>, StoreError> {
        let conn = self.connection()?;
        let window = conn
            .query_row(
                &format!(
                    "SELECT dep_min_modified, dep_max_modified FROM {} WHERE id=?1",
                    self.tables.main
                ),
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;
        match window {
            Some(window) => window_from_stamps(window),
            None => Ok(None),
        }
    }
}

fn window_from_stamps(
    (min, max): (Option<String>, Option<String>),
) -> Result<Option<ModifiedWindow>, StoreError> {
    let (Some(min), Some(max)) = (min, max) else {
        return Ok(None);
    };
    Ok(Some(ModifiedWindow {
        min: parse_stamp(&min)?,
        max: parse_stamp(&max)?,
    }))
}
