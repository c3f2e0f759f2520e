#![forbid(unsafe_code)]

use super::super::StoreError;
use rusqlite::Connection;

/// Table names derived from one base name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(in crate::store) struct Tables {
    pub(in crate::store) main: String,
    pub(in crate::store) identifiers: String,
    pub(in crate::store) versions: String,
    pub(in crate::store) dependencies: String,
    pub(in crate::store) settings: String,
    pub(in crate::store) profiles: String,
}

impl Tables {
    pub(in crate::store) fn new(base: &str) -> Self {
        Self {
            main: base.to_string(),
            identifiers: format!("{base}__identifiers"),
            versions: format!("{base}__versions"),
            dependencies: format!("{base}__dependencies"),
            settings: format!("{base}__settings"),
            profiles: format!("{base}__profiles"),
        }
    }
}

pub(in crate::store) fn install_schema(conn: &Connection, tables: &Tables) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {main} (
          id TEXT PRIMARY KEY NOT NULL,
          data TEXT NOT NULL,
          collection TEXT NOT NULL,
          changed_in TEXT NOT NULL,
          changed_by TEXT,
          checksum TEXT NOT NULL,
          deleted INTEGER NOT NULL DEFAULT 0,
          created TEXT NOT NULL,
          modified TEXT NOT NULL,
          dep_min_modified TEXT,
          dep_max_modified TEXT
        );
        CREATE INDEX IF NOT EXISTS {main}_modified_idx ON {main}(modified, id);
        CREATE INDEX IF NOT EXISTS {main}_collection_idx ON {main}(collection);

        CREATE TABLE IF NOT EXISTS {versions} (
          pk INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL,
          data TEXT NOT NULL,
          collection TEXT NOT NULL,
          changed_in TEXT NOT NULL,
          changed_by TEXT,
          checksum TEXT NOT NULL,
          deleted INTEGER NOT NULL DEFAULT 0,
          created TEXT NOT NULL,
          modified TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {versions}_id_idx ON {versions}(id, modified);
        CREATE INDEX IF NOT EXISTS {versions}_checksum_idx ON {versions}(id, checksum);

        CREATE TABLE IF NOT EXISTS {identifiers} (
          iri TEXT PRIMARY KEY NOT NULL,
          id TEXT NOT NULL,
          graph_index INTEGER NOT NULL,
          main_id INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {identifiers}_id_idx ON {identifiers}(id);
        CREATE UNIQUE INDEX IF NOT EXISTS {identifiers}_main_idx
          ON {identifiers}(id, graph_index) WHERE main_id = 1;

        CREATE TABLE IF NOT EXISTS {dependencies} (
          id TEXT NOT NULL,
          relation TEXT NOT NULL,
          dependson_id TEXT NOT NULL,
          PRIMARY KEY(id, relation, dependson_id)
        );
        CREATE INDEX IF NOT EXISTS {dependencies}_dependson_idx ON {dependencies}(dependson_id);

        CREATE TABLE IF NOT EXISTS {settings} (
          key TEXT PRIMARY KEY NOT NULL,
          settings TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {profiles} (
          library_id TEXT PRIMARY KEY NOT NULL,
          profile TEXT NOT NULL
        );
        "#,
        main = tables.main,
        versions = tables.versions,
        identifiers = tables.identifiers,
        dependencies = tables.dependencies,
        settings = tables.settings,
        profiles = tables.profiles,
    ))?;
    Ok(())
}
