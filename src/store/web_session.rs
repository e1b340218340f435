//! Browser sessions: opaque cookie id → DID.

use chrono::{SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::Store;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSession {
    pub id: String,
    pub did: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct WebSessionStore {
    store: Store,
}

impl WebSessionStore {
    pub(super) fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, did: &str) -> Result<WebSession, AppError> {
        let session = WebSession {
            id: Uuid::new_v4().simple().to_string(),
            did: did.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO web_sessions (id, did, created_at) VALUES (?1, ?2, ?3)",
            params![session.id, session.did, session.created_at],
        )
        .map_err(|e| AppError::Store(format!("create web session: {e}")))?;
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Option<WebSession>, AppError> {
        let conn = self.store.conn()?;
        conn.query_row(
            "SELECT id, did, created_at FROM web_sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok(WebSession {
                    id: row.get(0)?,
                    did: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Store(format!("read web session: {e}")))
    }

    pub fn del(&self, id: &str) -> Result<(), AppError> {
        let conn = self.store.conn()?;
        conn.execute("DELETE FROM web_sessions WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("delete web session: {e}")))?;
        Ok(())
    }

    /// Drop every browser session bound to `did`.
    pub fn del_for_did(&self, did: &str) -> Result<usize, AppError> {
        let conn = self.store.conn()?;
        conn.execute("DELETE FROM web_sessions WHERE did = ?1", params![did])
            .map_err(|e| AppError::Store(format!("delete web sessions for {did}: {e}")))
    }
}
