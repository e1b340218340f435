//! Repository-reading seam.
//!
//! The AppView only ever needs two read calls against a repository host. They
//! sit behind [`RepoReader`] so the aggregation code can run against
//! [`XrpcClient`](super::XrpcClient) in production and an in-memory map in
//! tests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;

/// One record as returned by `com.atproto.repo.listRecords` / `getRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedRecord {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    pub value: Value,
}

/// A page of `listRecords` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub cursor: Option<String>,
    pub records: Vec<ListedRecord>,
}

#[async_trait]
pub trait RepoReader: Send + Sync {
    /// `com.atproto.repo.listRecords`.
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, AppError>;

    /// `com.atproto.repo.getRecord`. A missing record is [`AppError::NotFound`].
    async fn get_record(&self, repo: &str, collection: &str, rkey: &str)
    -> Result<ListedRecord, AppError>;
}
