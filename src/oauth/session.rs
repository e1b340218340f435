//! Authenticated XRPC against the signed-in user's PDS.

use std::sync::Mutex;

use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::dpop::{DPOP_HEADER, DpopKey, NONCE_HEADER, USE_DPOP_NONCE};
use super::server_metadata::AuthServerMetadata;
use crate::atproto::xrpc::{decode, decode_body};
use crate::error::AppError;

/// Seconds before expiry at which an access token is refreshed.
pub const REFRESH_LEEWAY_SECS: i64 = 60;

/// Tokens and keys persisted per DID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    pub did: String,
    pub pds: String,
    pub auth_server: AuthServerMetadata,
    pub dpop_key: DpopKey,
    /// Latest nonce issued by the authorization server.
    #[serde(default)]
    pub dpop_nonce: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: String,
    /// Unix seconds; `None` when the server did not say.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl SavedSession {
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at - REFRESH_LEEWAY_SECS <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedRecord {
    pub uri: String,
    pub cid: String,
}

pub struct OAuthSession {
    http: Client,
    session: SavedSession,
    pds_nonce: Mutex<Option<String>>,
}

impl OAuthSession {
    pub(crate) fn new(http: Client, session: SavedSession) -> Self {
        Self { http, session, pds_nonce: Mutex::new(None) }
    }

    pub fn did(&self) -> &str {
        &self.session.did
    }

    /// `com.atproto.repo.createRecord` in the user's own repo.
    pub async fn create_record(&self, collection: &str, record: &Value) -> Result<CreatedRecord, AppError> {
        let body = json!({
            "repo": self.session.did,
            "collection": collection,
            "record": record,
        });
        self.call(Method::POST, "com.atproto.repo.createRecord", &[], Some(&body)).await
    }

    /// One XRPC call with `Authorization: DPoP`. Retried once when the PDS
    /// asks for a fresh nonce.
    pub async fn call<T, B>(
        &self,
        method: Method,
        nsid: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/xrpc/{nsid}", self.session.pds.trim_end_matches('/'));
        let resp = self.send(&method, &url, query, body).await?;
        let status = resp.status();
        let has_nonce = resp.headers().contains_key(NONCE_HEADER);
        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await?;
        if wants_new_nonce(status, has_nonce, challenge.as_deref(), &text) {
            debug!(%nsid, "retrying with fresh PDS DPoP nonce");
            let retry = self.send(&method, &url, query, body).await?;
            return decode(nsid, retry).await;
        }
        decode_body(nsid, status, &text)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response, AppError> {
        let nonce = self.pds_nonce.lock().map(|n| n.clone()).unwrap_or_default();
        let proof = self.session.dpop_key.proof(
            method.as_str(),
            url,
            nonce.as_deref(),
            Some(&self.session.access_token),
        )?;
        let mut req = self
            .http
            .request(method.clone(), url)
            .header("Authorization", format!("DPoP {}", self.session.access_token))
            .header(DPOP_HEADER, proof);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        if let Some(fresh) = resp.headers().get(NONCE_HEADER).and_then(|v| v.to_str().ok()) {
            if let Ok(mut slot) = self.pds_nonce.lock() {
                *slot = Some(fresh.to_string());
            }
        }
        Ok(resp)
    }
}

/// A nonce challenge is a 401 naming `use_dpop_nonce` in `WWW-Authenticate`
/// or a 400 whose error body is `use_dpop_nonce`.
fn wants_new_nonce(status: StatusCode, has_nonce: bool, challenge: Option<&str>, body: &str) -> bool {
    if !has_nonce {
        return false;
    }
    match status {
        StatusCode::UNAUTHORIZED => challenge.is_some_and(|v| v.contains(USE_DPOP_NONCE)),
        StatusCode::BAD_REQUEST => serde_json::from_str::<Value>(body)
            .ok()
            .is_some_and(|v| v["error"].as_str() == Some(USE_DPOP_NONCE)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(expires_at: Option<i64>) -> SavedSession {
        SavedSession {
            did: "did:plc:alice".into(),
            pds: "https://pds.example.com".into(),
            auth_server: AuthServerMetadata {
                issuer: "https://auth.example.com".into(),
                authorization_endpoint: "https://auth.example.com/oauth/authorize".into(),
                token_endpoint: "https://auth.example.com/oauth/token".into(),
                pushed_authorization_request_endpoint: "https://auth.example.com/oauth/par".into(),
                revocation_endpoint: None,
                dpop_signing_alg_values_supported: vec!["ES256".into()],
            },
            dpop_key: DpopKey::generate(),
            dpop_nonce: None,
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            token_type: "DPoP".into(),
            scope: "atproto transition:generic".into(),
            expires_at,
        }
    }

    #[test]
    fn refresh_window() {
        let now = 1_000_000;
        assert!(!saved(None).needs_refresh(now));
        assert!(!saved(Some(now + 3600)).needs_refresh(now));
        assert!(saved(Some(now + 30)).needs_refresh(now));
        assert!(saved(Some(now - 5)).needs_refresh(now));
    }

    #[test]
    fn saved_session_round_trips_through_json() {
        let s = saved(Some(42));
        let back: SavedSession = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(back.did, s.did);
        assert_eq!(back.dpop_key.public_jwk(), s.dpop_key.public_jwk());
    }

    #[test]
    fn nonce_retry_only_on_nonce_challenges() {
        let nonce_body = r#"{"error":"use_dpop_nonce","message":"nonce required"}"#;
        let other_body = r#"{"error":"InvalidRequest","message":"bad record"}"#;

        assert!(wants_new_nonce(StatusCode::BAD_REQUEST, true, None, nonce_body));
        assert!(!wants_new_nonce(StatusCode::BAD_REQUEST, true, None, other_body));
        assert!(!wants_new_nonce(StatusCode::BAD_REQUEST, false, None, nonce_body));
        assert!(!wants_new_nonce(StatusCode::BAD_REQUEST, true, None, "not json"));

        let challenge = r#"DPoP error="use_dpop_nonce", error_description="fresh nonce""#;
        assert!(wants_new_nonce(StatusCode::UNAUTHORIZED, true, Some(challenge), ""));
        assert!(!wants_new_nonce(StatusCode::UNAUTHORIZED, true, Some(r#"DPoP error="invalid_token""#), ""));
        assert!(!wants_new_nonce(StatusCode::INTERNAL_SERVER_ERROR, true, None, nonce_body));
    }
}
