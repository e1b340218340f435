//! Unauthenticated XRPC client over `reqwest`.
//!
//! All wire types stay private to this module except the ones callers
//! consume ([`RecordPage`], [`ListedRecord`], [`Profile`]).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use super::repo::{ListedRecord, RecordPage, RepoReader};
use crate::error::AppError;

/// XRPC error body: `{ "error": "...", "message": "..." }`.
#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

/// Subset of `app.bsky.actor.defs#profileViewDetailed` shown to the browser.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Client for one XRPC service (a PDS, an entryway, or the public AppView).
///
/// Cheap to clone; `reqwest::Client` is reference-counted internally.
#[derive(Debug, Clone)]
pub struct XrpcClient {
    client: Client,
    service: String,
}

impl XrpcClient {
    pub fn new(service: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Xrpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, service))
    }

    pub fn with_client(client: Client, service: &str) -> Self {
        Self { client, service: service.trim_end_matches('/').to_string() }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{nsid}", self.service)
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AppError> {
        debug!(service = %self.service, %nsid, "xrpc query");
        let resp = self.client.get(self.method_url(nsid)).query(params).send().await?;
        decode(nsid, resp).await
    }

    /// `com.atproto.identity.resolveHandle`.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, AppError> {
        let out: ResolveHandleOutput = self
            .query("com.atproto.identity.resolveHandle", &[("handle", handle)])
            .await?;
        Ok(out.did)
    }

    /// `app.bsky.actor.getProfile`.
    pub async fn get_profile(&self, actor: &str) -> Result<Profile, AppError> {
        self.query("app.bsky.actor.getProfile", &[("actor", actor)]).await
    }
}

/// Turn an XRPC response into `T`, or into the matching [`AppError`].
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
    nsid: &str,
    resp: Response,
) -> Result<T, AppError> {
    let status = resp.status();
    let body = resp.text().await?;
    decode_body(nsid, status, &body)
}

/// [`decode`] for a response whose body has already been read.
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(
    nsid: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, AppError> {
    if status.is_success() {
        trace!(%nsid, %body, "xrpc response");
        return serde_json::from_str(body)
            .map_err(|e| AppError::Xrpc(format!("{nsid}: malformed response: {e}")));
    }
    let err: XrpcErrorBody =
        serde_json::from_str(body).unwrap_or(XrpcErrorBody { error: None, message: None });
    Err(error_from(nsid, status.as_u16(), err.error.as_deref(), err.message.as_deref()))
}

fn error_from(nsid: &str, status: u16, error: Option<&str>, message: Option<&str>) -> AppError {
    let detail = format!(
        "{nsid} returned {status}: {}{}",
        error.unwrap_or("UnknownError"),
        message.map(|m| format!(" ({m})")).unwrap_or_default()
    );
    match error {
        Some("RecordNotFound") => AppError::NotFound(detail),
        _ if status == 404 => AppError::NotFound(detail),
        Some("InvalidRequest") if status == 400 => AppError::InvalidRequest(detail),
        _ => AppError::Xrpc(detail),
    }
}

#[async_trait]
impl RepoReader for XrpcClient {
    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, AppError> {
        let limit = limit.to_string();
        let mut params = vec![("repo", repo), ("collection", collection), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        self.query("com.atproto.repo.listRecords", &params).await
    }

    async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<ListedRecord, AppError> {
        self.query(
            "com.atproto.repo.getRecord",
            &[("repo", repo), ("collection", collection), ("rkey", rkey)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_url_is_normalised() {
        let c = XrpcClient::new("https://bsky.social/", 5).unwrap();
        assert_eq!(c.service(), "https://bsky.social");
        assert_eq!(
            c.method_url("com.atproto.repo.getRecord"),
            "https://bsky.social/xrpc/com.atproto.repo.getRecord"
        );
    }

    #[test]
    fn record_not_found_maps_to_not_found() {
        let e = error_from("com.atproto.repo.getRecord", 400, Some("RecordNotFound"), Some("gone"));
        assert!(matches!(e, AppError::NotFound(_)));
        assert!(e.to_string().contains("gone"));
    }

    #[test]
    fn other_errors_are_upstream() {
        let e = error_from("com.atproto.repo.listRecords", 500, None, None);
        assert!(matches!(e, AppError::Xrpc(_)));
        let e = error_from("com.atproto.repo.listRecords", 400, Some("InvalidRequest"), None);
        assert!(matches!(e, AppError::InvalidRequest(_)));
    }

    #[test]
    fn profile_deserialises_camel_case() {
        let p: Profile = serde_json::from_str(
            r#"{"did":"did:plc:a","handle":"a.test","displayName":"A","avatar":"https://x/y.jpg","followersCount":3}"#,
        )
        .unwrap();
        assert_eq!(p.display_name.as_deref(), Some("A"));
    }
}
