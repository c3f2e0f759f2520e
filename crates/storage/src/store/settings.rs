#![forbid(unsafe_code)]

use super::{Storage, StoreError};
use rusqlite::{OptionalExtension, params};
use serde_json::Value;

impl Storage {
    pub fn save_settings(&self, key: &str, settings: &Value) -> Result<(), StoreError> {
        if key.trim().is_empty() {
            return Err(StoreError::InvalidInput("settings key must not be empty"));
        }
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {}(key, settings) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET settings=excluded.settings",
                self.tables.settings
            ),
            params![key, serde_json::to_string(settings)?],
        )?;
        Ok(())
    }

    pub fn load_settings(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.connection()?;
        let raw = conn
            .query_row(
                &format!("SELECT settings FROM {} WHERE key=?1", self.tables.settings),
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Stores the profile blob of a library, replacing any previous one.
    pub fn save_profile(&self, library_id: &str, profile: &str) -> Result<(), StoreError> {
        if library_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("library id must not be empty"));
        }
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {}(library_id, profile) VALUES (?1, ?2) \
                 ON CONFLICT(library_id) DO UPDATE SET profile=excluded.profile",
                self.tables.profiles
            ),
            params![library_id, profile],
        )?;
        Ok(())
    }

    pub fn load_profile(&self, library_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connection()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT profile FROM {} WHERE library_id=?1",
                    self.tables.profiles
                ),
                params![library_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }
}
