//! SQLite-backed run store

use crate::{unix_now, StoreError};
use corefchain_domain::traits::RunStore;
use corefchain_domain::{ArtifactHandle, ArtifactKind, EntityCategory, RunKey, RunState};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-based implementation of RunStore
///
/// Each `put_artifact` and `save_state` is a single statement, so SQLite's
/// own atomicity gives commit-or-nothing writes.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Share a `SqliteStore` behind a mutex.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given database path
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }

    fn location(key: &RunKey, kind: ArtifactKind) -> String {
        format!("sqlite://{}/{}/{}", key.document_id, key.category, kind.name())
    }
}

impl RunStore for SqliteStore {
    type Error = StoreError;

    fn load_state(&self, key: &RunKey) -> Result<Option<RunState>, Self::Error> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM run_state WHERE document_id = ?1 AND category = ?2",
                params![&key.document_id, key.category.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn save_state(&mut self, state: &RunState) -> Result<(), Self::Error> {
        let body = serde_json::to_string(state)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO run_state (document_id, category, status, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &state.key.document_id,
                state.key.category.as_str(),
                state.status.as_str(),
                &body,
                state.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    fn put_artifact(
        &mut self,
        key: &RunKey,
        kind: ArtifactKind,
        body: &str,
    ) -> Result<ArtifactHandle, Self::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO artifacts (document_id, category, kind, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &key.document_id,
                key.category.as_str(),
                kind.name(),
                body,
                unix_now() as i64,
            ],
        )?;

        Ok(ArtifactHandle {
            kind,
            location: Self::location(key, kind),
        })
    }

    fn get_artifact(&self, key: &RunKey, kind: ArtifactKind) -> Result<Option<String>, Self::Error> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM artifacts WHERE document_id = ?1 AND category = ?2 AND kind = ?3",
                params![&key.document_id, key.category.as_str(), kind.name()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn list_runs(&self, document_id: &str) -> Result<Vec<RunKey>, Self::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT category FROM run_state WHERE document_id = ?1")?;
        let categories = stmt
            .query_map(params![document_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut keys = categories
            .iter()
            .map(|c| {
                EntityCategory::parse(c)
                    .map(|category| RunKey::new(document_id, category))
                    .ok_or_else(|| StoreError::InvalidData(format!("Unknown category: {}", c)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        keys.sort();
        Ok(keys)
    }
}
