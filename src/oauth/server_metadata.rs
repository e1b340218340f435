//! Authorization server discovery (RFC 9728 → RFC 8414).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct ProtectedResource {
    #[serde(default)]
    authorization_servers: Vec<String>,
}

/// The fields of the authorization server metadata this client uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub pushed_authorization_request_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

impl AuthServerMetadata {
    fn check(self, expected_issuer: &str) -> Result<Self, AppError> {
        if self.issuer.trim_end_matches('/') != expected_issuer.trim_end_matches('/') {
            return Err(AppError::OAuth(format!(
                "issuer mismatch: metadata says {}, expected {expected_issuer}",
                self.issuer
            )));
        }
        if !self.dpop_signing_alg_values_supported.is_empty()
            && !self.dpop_signing_alg_values_supported.iter().any(|a| a == "ES256")
        {
            return Err(AppError::OAuth(format!("{} does not support ES256 DPoP", self.issuer)));
        }
        Ok(self)
    }
}

/// Find the authorization server protecting `pds`.
pub async fn discover(http: &Client, pds: &str) -> Result<AuthServerMetadata, AppError> {
    let pds = pds.trim_end_matches('/');
    let resource: ProtectedResource =
        fetch_json(http, &format!("{pds}/.well-known/oauth-protected-resource")).await?;
    let issuer = resource
        .authorization_servers
        .into_iter()
        .next()
        .ok_or_else(|| AppError::OAuth(format!("{pds} lists no authorization servers")))?;
    debug!(%pds, %issuer, "discovered authorization server");
    authorization_server(http, &issuer).await
}

pub async fn authorization_server(http: &Client, issuer: &str) -> Result<AuthServerMetadata, AppError> {
    let url = format!("{}/.well-known/oauth-authorization-server", issuer.trim_end_matches('/'));
    let meta: AuthServerMetadata = fetch_json(http, &url).await?;
    meta.check(issuer)
}

async fn fetch_json<T: serde::de::DeserializeOwned>(http: &Client, url: &str) -> Result<T, AppError> {
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(AppError::OAuth(format!("{url} returned {}", resp.status())));
    }
    resp.json().await.map_err(|e| AppError::OAuth(format!("malformed metadata at {url}: {e}")))
}
