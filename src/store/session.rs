//! OAuth sessions, one row per DID.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Store, from_json, to_json};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SessionStore {
    store: Store,
}

impl SessionStore {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get<T: DeserializeOwned>(&self, did: &str) -> Result<Option<T>, AppError> {
        let conn = self.store.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT session FROM bsky_auth_sessions WHERE key = ?1",
                params![did],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("read session: {e}")))?;
        raw.as_deref().map(from_json).transpose()
    }

    /// Insert or replace the session for `did`. `created_at` keeps the time
    /// of the first login.
    pub fn set<T: Serialize>(&self, did: &str, session: &T) -> Result<(), AppError> {
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO bsky_auth_sessions (key, session) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET session = excluded.session",
            params![did, to_json(session)?],
        )
        .map_err(|e| AppError::Store(format!("write session: {e}")))?;
        Ok(())
    }

    pub fn del(&self, did: &str) -> Result<(), AppError> {
        let conn = self.store.conn()?;
        conn.execute("DELETE FROM bsky_auth_sessions WHERE key = ?1", params![did])
            .map_err(|e| AppError::Store(format!("delete session: {e}")))?;
        Ok(())
    }
}
