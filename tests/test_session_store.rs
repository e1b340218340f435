//! Integration tests for the SQLite store.
//!
//! Run with:
//!   cargo test --test test_session_store

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use atgeo_marker::store::Store;

// ── helpers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FakeSession {
    access_token: String,
    expires_at: i64,
}

fn open() -> (TempDir, Store) {
    let tmp = TempDir::new().expect("tempdir");
    let store = Store::open(&tmp.path().join("db.sqlite")).expect("open store");
    (tmp, store)
}

fn session(token: &str) -> FakeSession {
    FakeSession { access_token: token.into(), expires_at: 1_700_000_000 }
}

// ── SessionStore ──────────────────────────────────────────────────────────────

#[test]
fn session_set_replaces_previous_login() {
    let (_tmp, store) = open();
    let sessions = store.sessions();
    sessions.set("did:plc:alice", &session("first")).unwrap();
    sessions.set("did:plc:alice", &session("second")).unwrap();

    let got: FakeSession = sessions.get("did:plc:alice").unwrap().unwrap();
    assert_eq!(got.access_token, "second");

    let rows: i64 = Connection::open(store.db_path())
        .unwrap()
        .query_row("SELECT COUNT(*) FROM bsky_auth_sessions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn session_del_and_missing_get() {
    let (_tmp, store) = open();
    let sessions = store.sessions();
    assert!(sessions.get::<FakeSession>("did:plc:bob").unwrap().is_none());
    sessions.set("did:plc:bob", &session("t")).unwrap();
    sessions.del("did:plc:bob").unwrap();
    assert!(sessions.get::<FakeSession>("did:plc:bob").unwrap().is_none());
    // Deleting again is not an error.
    sessions.del("did:plc:bob").unwrap();
}

#[test]
fn session_created_at_is_filled_in() {
    let (_tmp, store) = open();
    store.sessions().set("did:plc:carol", &session("t")).unwrap();
    let created: String = Connection::open(store.db_path())
        .unwrap()
        .query_row(
            "SELECT created_at FROM bsky_auth_sessions WHERE key = 'did:plc:carol'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(!created.is_empty());
}

#[test]
fn undecodable_session_is_a_store_error() {
    let (_tmp, store) = open();
    Connection::open(store.db_path())
        .unwrap()
        .execute(
            "INSERT INTO bsky_auth_sessions (key, session) VALUES ('did:plc:x', 'not json')",
            [],
        )
        .unwrap();
    assert!(store.sessions().get::<FakeSession>("did:plc:x").is_err());
}

// ── persistence ───────────────────────────────────────────────────────────────

#[test]
fn data_survives_reopen() {
    let (tmp, store) = open();
    store.sessions().set("did:plc:dave", &session("keep")).unwrap();
    store.states().set("state-1", &session("pending")).unwrap();
    let web = store.web_sessions().create("did:plc:dave").unwrap();
    drop(store);

    let reopened = Store::open(&tmp.path().join("db.sqlite")).unwrap();
    let got: FakeSession = reopened.sessions().get("did:plc:dave").unwrap().unwrap();
    assert_eq!(got.access_token, "keep");
    assert_eq!(reopened.web_sessions().get(&web.id).unwrap().unwrap().did, "did:plc:dave");
    assert!(reopened.states().take::<FakeSession>("state-1").unwrap().is_some());
    assert!(reopened.states().take::<FakeSession>("state-1").unwrap().is_none());
}

#[test]
fn stores_share_one_database() {
    let (_tmp, store) = open();
    let a = store.states();
    let b = store.clone().states();
    a.set("shared", &session("x")).unwrap();
    assert!(b.get::<FakeSession>("shared").unwrap().is_some());
}
