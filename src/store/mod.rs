//! SQLite persistence for OAuth state, OAuth sessions and browser
//! sessions.
//!
//! Every operation opens its own connection (WAL mode keeps readers and the
//! single writer out of each other's way), so the store types are plain
//! `Clone` handles around the database path.
//!
//! ## Schema
//! Versions are tracked in `PRAGMA user_version`:
//! - **v1**: `bsky_auth_sessions`, `bsky_auth_state`.
//! - **v2**: `web_sessions`.

mod session;
mod state;
mod web_session;

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;

pub use session::SessionStore;
pub use state::StateStore;
pub use web_session::{WebSession, WebSessionStore};

pub(crate) const SCHEMA_VERSION: i64 = 2;

const MIGRATIONS: [&str; 2] = [
    "
    CREATE TABLE IF NOT EXISTS bsky_auth_sessions (
        key TEXT PRIMARY KEY,
        session TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS bsky_auth_state (
        key TEXT PRIMARY KEY,
        state TEXT NOT NULL
    );

    PRAGMA user_version = 1;
    ",
    "
    CREATE TABLE IF NOT EXISTS web_sessions (
        id TEXT PRIMARY KEY,
        did TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS web_sessions_did ON web_sessions(did);

    PRAGMA user_version = 2;
    ",
];

/// Handle to the application database.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to [`SCHEMA_VERSION`].
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = Self { db_path: db_path.to_path_buf() };
        store.migrate()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn states(&self) -> StateStore {
        StateStore::new(self.clone())
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.clone())
    }

    pub fn web_sessions(&self) -> WebSessionStore {
        WebSessionStore::new(self.clone())
    }

    pub(crate) fn conn(&self) -> Result<Connection, AppError> {
        open_conn(&self.db_path)
    }

    fn migrate(&self) -> Result<(), AppError> {
        let conn = self.conn()?;
        let version = schema_version(&conn)?;
        if version > SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "unsupported schema version {version}, expected at most {SCHEMA_VERSION}"
            )));
        }
        for (idx, ddl) in MIGRATIONS.iter().enumerate().skip(version as usize) {
            debug!(version = idx + 1, path = %self.db_path.display(), "applying store migration");
            conn.execute_batch(ddl)
                .map_err(|e| AppError::Store(format!("migration to v{}: {e}", idx + 1)))?;
        }
        Ok(())
    }
}

pub(crate) fn schema_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|e| AppError::Store(format!("read schema version: {e}")))
}

/// Open a connection to `db_path` with the pragmas every store relies on.
fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Store(format!("set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

    Ok(conn)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Store(format!("encode value: {e}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::Store(format!("decode value: {e}")))
}
