//! In-memory [`RepoReader`] for tests and local fixtures.
//!
//! Records are keyed by their AT URI. `get_record` calls are counted per URI
//! so callers can assert how often an entry was fetched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::repo::{ListedRecord, RecordPage, RepoReader};
use super::uri::AtUri;
use crate::error::AppError;

#[derive(Default)]
pub struct MemoryRepo {
    records: Mutex<BTreeMap<String, Value>>,
    lookups: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `at://repo/collection/rkey`.
    pub fn insert(&self, repo: &str, collection: &str, rkey: &str, value: Value) -> String {
        let uri = AtUri::record(repo, collection, rkey).to_string();
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(uri.clone(), value);
        uri
    }

    /// Make every read of `repo` fail with an upstream error.
    pub fn fail_repo(&self, repo: &str) {
        self.failing.lock().unwrap_or_else(|p| p.into_inner()).insert(repo.to_string());
    }

    /// Number of `get_record` calls made for `uri`.
    pub fn lookups(&self, uri: &str) -> usize {
        self.lookups
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(uri)
            .copied()
            .unwrap_or(0)
    }

    fn check_failing(&self, repo: &str) -> Result<(), AppError> {
        if self.failing.lock().unwrap_or_else(|p| p.into_inner()).contains(repo) {
            return Err(AppError::Xrpc(format!("repo {repo} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl RepoReader for MemoryRepo {
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, AppError> {
        self.check_failing(repo)?;
        let prefix = format!("at://{repo}/{collection}/");
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let mut matching = records
            .iter()
            .filter(|(uri, _)| uri.starts_with(&prefix))
            .filter(|(uri, _)| cursor.is_none_or(|c| uri.as_str() > c));

        let page: Vec<ListedRecord> = matching
            .by_ref()
            .take(limit as usize)
            .map(|(uri, value)| ListedRecord { uri: uri.clone(), cid: None, value: value.clone() })
            .collect();
        let cursor = match matching.next() {
            Some(_) => page.last().map(|r| r.uri.clone()),
            None => None,
        };
        Ok(RecordPage { cursor, records: page })
    }

    async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<ListedRecord, AppError> {
        let uri = AtUri::record(repo, collection, rkey).to_string();
        *self
            .lookups
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(uri.clone())
            .or_default() += 1;
        self.check_failing(repo)?;
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        match records.get(&uri) {
            Some(value) => Ok(ListedRecord { uri, cid: None, value: value.clone() }),
            None => Err(AppError::NotFound(format!("RecordNotFound: {uri}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn lists_by_collection_with_paging() {
        let repo = MemoryRepo::new();
        for k in ["a", "b", "c"] {
            repo.insert("did:plc:x", "col.one", k, json!({ "k": k }));
        }
        repo.insert("did:plc:x", "col.two", "z", json!({}));

        let first = repo.list_records("did:plc:x", "col.one", 2, None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let cursor = first.cursor.clone().unwrap();
        let second = repo.list_records("did:plc:x", "col.one", 2, Some(&cursor)).await.unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn get_counts_lookups_and_reports_missing() {
        let repo = MemoryRepo::new();
        let uri = repo.insert("did:plc:x", "app.bsky.feed.post", "1", json!({ "text": "hi" }));
        assert!(repo.get_record("did:plc:x", "app.bsky.feed.post", "1").await.is_ok());
        assert!(matches!(
            repo.get_record("did:plc:x", "app.bsky.feed.post", "2").await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(repo.lookups(&uri), 1);
    }
}
