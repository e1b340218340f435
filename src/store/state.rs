//! In-flight OAuth authorization state, keyed by the `state` parameter.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Store, from_json, to_json};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct StateStore {
    store: Store,
}

impl StateStore {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let conn = self.store.conn()?;
        let raw: Option<String> = conn
            .query_row("SELECT state FROM bsky_auth_state WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| AppError::Store(format!("read auth state: {e}")))?;
        raw.as_deref().map(from_json).transpose()
    }

    pub fn set<T: Serialize>(&self, key: &str, state: &T) -> Result<(), AppError> {
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO bsky_auth_state (key, state) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET state = excluded.state",
            params![key, to_json(state)?],
        )
        .map_err(|e| AppError::Store(format!("write auth state: {e}")))?;
        Ok(())
    }

    pub fn del(&self, key: &str) -> Result<(), AppError> {
        let conn = self.store.conn()?;
        conn.execute("DELETE FROM bsky_auth_state WHERE key = ?1", params![key])
            .map_err(|e| AppError::Store(format!("delete auth state: {e}")))?;
        Ok(())
    }

    /// Read and delete in one step; a state can be consumed only once.
    pub fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let conn = self.store.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "DELETE FROM bsky_auth_state WHERE key = ?1 RETURNING state",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("take auth state: {e}")))?;
        raw.as_deref().map(from_json).transpose()
    }
}
