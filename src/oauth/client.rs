//! OAuth client flows: authorize, callback, restore, revoke.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::dpop::{DPOP_HEADER, DpopKey, NONCE_HEADER, USE_DPOP_NONCE};
use super::keys::ClientKeys;
use super::metadata::{ClientMetadata, SCOPE};
use super::pkce::{self, Pkce};
use super::server_metadata::{self, AuthServerMetadata};
use super::session::{OAuthSession, SavedSession};
use crate::atproto::identity::IdentityResolver;
use crate::config::Config;
use crate::error::AppError;
use crate::store::{SessionStore, StateStore, Store};

/// In-flight authorization, stored under its `state` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedState {
    pub auth_server: AuthServerMetadata,
    pub pds: String,
    pub expected_did: String,
    pub pkce_verifier: String,
    pub dpop_key: DpopKey,
    #[serde(default)]
    pub dpop_nonce: Option<String>,
    pub created_at: i64,
}

/// Query parameters the authorization server redirects back with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParResponse {
    request_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    sub: String,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Per-DID locks held while a refresh token is spent.
type RefreshLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct OAuthClient {
    http: Client,
    metadata: ClientMetadata,
    keys: ClientKeys,
    resolver: IdentityResolver,
    states: StateStore,
    sessions: SessionStore,
    refresh_locks: RefreshLocks,
}

impl OAuthClient {
    pub fn new(config: &Config, store: &Store) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.atproto.timeout_seconds))
            .build()
            .map_err(|e| AppError::OAuth(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            metadata: ClientMetadata::for_public_url(&config.web.public_url)?,
            keys: ClientKeys::load_or_create(&config.work_dir)?,
            resolver: IdentityResolver::new(
                &config.atproto.public_api,
                &config.atproto.plc_directory,
                config.atproto.timeout_seconds,
            )?,
            states: store.states(),
            sessions: store.sessions(),
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    pub fn jwks(&self) -> serde_json::Value {
        self.keys.jwks()
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Start a login for `input` (handle or DID). Returns the URL to send
    /// the browser to.
    pub async fn authorize(&self, input: &str) -> Result<String, AppError> {
        let identity = self.resolver.resolve(input).await?;
        let auth_server = server_metadata::discover(&self.http, &identity.pds).await?;

        let pkce = Pkce::generate();
        let dpop_key = DpopKey::generate();
        let state = pkce::random_token(16);

        let login_hint = identity.handle.clone().unwrap_or_else(|| identity.did.clone());
        let mut saved = SavedState {
            auth_server,
            pds: identity.pds,
            expected_did: identity.did.clone(),
            pkce_verifier: pkce.verifier,
            dpop_key,
            dpop_nonce: None,
            created_at: Utc::now().timestamp(),
        };
        // Stored before the PAR so the callback can never outrun it.
        self.states.set(&state, &saved)?;

        let form = [
            ("client_id", self.metadata.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.metadata.redirect_uri()),
            ("scope", SCOPE),
            ("state", state.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", pkce::METHOD),
            ("login_hint", login_hint.as_str()),
        ];
        let par: Result<ParResponse, AppError> = self
            .token_post(
                &saved.auth_server.pushed_authorization_request_endpoint,
                &form,
                &saved.dpop_key,
                &mut saved.dpop_nonce,
            )
            .await;
        let par = match par {
            Ok(par) => par,
            Err(e) => {
                self.states.del(&state)?;
                return Err(e);
            }
        };

        let url = Url::parse_with_params(
            &saved.auth_server.authorization_endpoint,
            &[("client_id", self.metadata.client_id.as_str()), ("request_uri", par.request_uri.as_str())],
        )
        .map_err(|e| AppError::OAuth(format!("bad authorization endpoint: {e}")))?;

        // Keep the nonce the PAR endpoint handed out for the token exchange.
        self.states.set(&state, &saved)?;
        info!(did = %identity.did, "authorization started");
        Ok(url.to_string())
    }

    /// Finish a login. Returns the DID of the account that signed in.
    pub async fn callback(&self, params: &CallbackParams) -> Result<String, AppError> {
        if let Some(error) = &params.error {
            return Err(AppError::OAuth(format!(
                "authorization failed: {error}{}",
                params.error_description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
            )));
        }
        let key = params
            .state
            .as_deref()
            .ok_or_else(|| AppError::OAuth("callback is missing state".into()))?;
        let saved: SavedState = self
            .states
            .take(key)?
            .ok_or_else(|| AppError::OAuth("unknown or already used state".into()))?;

        match params.iss.as_deref() {
            Some(iss) if iss == saved.auth_server.issuer => {}
            Some(iss) => {
                return Err(AppError::OAuth(format!(
                    "issuer mismatch: got {iss}, expected {}",
                    saved.auth_server.issuer
                )));
            }
            None => return Err(AppError::OAuth("callback is missing iss".into())),
        }
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| AppError::OAuth("callback is missing code".into()))?;

        let mut nonce = saved.dpop_nonce.clone();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.metadata.redirect_uri()),
            ("code_verifier", saved.pkce_verifier.as_str()),
            ("client_id", self.metadata.client_id.as_str()),
        ];
        let tokens: TokenResponse = self
            .token_post(&saved.auth_server.token_endpoint, &form, &saved.dpop_key, &mut nonce)
            .await?;

        if tokens.sub != saved.expected_did {
            return Err(AppError::OAuth(format!(
                "token subject {} does not match {}",
                tokens.sub, saved.expected_did
            )));
        }
        let session = session_from_tokens(
            tokens,
            saved.pds,
            saved.auth_server,
            saved.dpop_key,
            nonce,
        )?;
        let did = session.did.clone();
        self.sessions.set(&did, &session)?;
        info!(%did, "login complete");
        Ok(did)
    }

    /// Load the session for `did`, refreshing tokens that are about to expire.
    ///
    /// Refresh tokens are single-use, so refreshes for one DID are serialized
    /// and a waiter re-reads the session the winner stored.
    pub async fn restore(&self, did: &str) -> Result<OAuthSession, AppError> {
        let session = self.load_session(did)?;
        if !session.needs_refresh(Utc::now().timestamp()) {
            return Ok(OAuthSession::new(self.http.clone(), session));
        }

        let lock = self.refresh_lock(did);
        let _guard = lock.lock().await;
        let session = self.load_session(did)?;
        if !session.needs_refresh(Utc::now().timestamp()) {
            debug!(%did, "session refreshed by a concurrent request");
            return Ok(OAuthSession::new(self.http.clone(), session));
        }
        match self.refresh(session).await {
            Ok(fresh) => Ok(OAuthSession::new(self.http.clone(), fresh)),
            Err(e) => {
                warn!(%did, "token refresh failed, dropping session: {e}");
                self.sessions.del(did)?;
                Err(AppError::TokenRefresh(e.to_string()))
            }
        }
    }

    fn load_session(&self, did: &str) -> Result<SavedSession, AppError> {
        self.sessions
            .get(did)?
            .ok_or_else(|| AppError::Unauthorized(format!("no session for {did}")))
    }

    fn refresh_lock(&self, did: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(did.to_string()).or_default().clone()
    }

    /// Revoke the tokens for `did` (best effort) and forget the session.
    pub async fn revoke(&self, did: &str) -> Result<(), AppError> {
        let Some(session) = self.sessions.get::<SavedSession>(did)? else {
            return Ok(());
        };
        if let Some(endpoint) = &session.auth_server.revocation_endpoint {
            let mut nonce = session.dpop_nonce.clone();
            let form = [
                ("token", session.access_token.as_str()),
                ("client_id", self.metadata.client_id.as_str()),
            ];
            let result: Result<serde_json::Value, AppError> =
                self.token_post(endpoint, &form, &session.dpop_key, &mut nonce).await;
            if let Err(e) = result {
                warn!(%did, "token revocation failed: {e}");
            }
        }
        self.sessions.del(did)?;
        info!(%did, "session revoked");
        Ok(())
    }

    async fn refresh(&self, session: SavedSession) -> Result<SavedSession, AppError> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::OAuth("session has no refresh token".into()))?;
        let mut nonce = session.dpop_nonce.clone();
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.metadata.client_id.as_str()),
        ];
        let tokens: TokenResponse = self
            .token_post(&session.auth_server.token_endpoint, &form, &session.dpop_key, &mut nonce)
            .await?;
        if tokens.sub != session.did {
            return Err(AppError::OAuth(format!(
                "refreshed token subject {} does not match {}",
                tokens.sub, session.did
            )));
        }
        let mut fresh = session_from_tokens(tokens, session.pds, session.auth_server, session.dpop_key, nonce)?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        self.sessions.set(&fresh.did, &fresh)?;
        debug!(did = %fresh.did, "tokens refreshed");
        Ok(fresh)
    }

    /// Form POST to an authorization server endpoint with a DPoP proof.
    /// Retried once when the server answers `use_dpop_nonce`.
    async fn token_post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
        key: &DpopKey,
        nonce: &mut Option<String>,
    ) -> Result<T, AppError> {
        for attempt in 0..2 {
            let proof = key.proof("POST", url, nonce.as_deref(), None)?;
            let resp = self
                .http
                .post(url)
                .header(DPOP_HEADER, proof)
                .form(form)
                .send()
                .await?;
            let fresh = resp
                .headers()
                .get(NONCE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let nonce_changed = fresh.is_some() && fresh != *nonce;
            if fresh.is_some() {
                *nonce = fresh;
            }

            let status = resp.status();
            if status.is_success() {
                let body = resp.text().await?;
                if body.trim().is_empty() {
                    return serde_json::from_str("null")
                        .map_err(|e| AppError::OAuth(format!("{url}: empty response: {e}")));
                }
                return serde_json::from_str(&body)
                    .map_err(|e| AppError::OAuth(format!("{url}: malformed response: {e}")));
            }

            let body: OAuthErrorBody = resp.json().await.unwrap_or_default();
            if attempt == 0 && nonce_changed && body.error.as_deref() == Some(USE_DPOP_NONCE) {
                debug!(%url, "retrying with fresh DPoP nonce");
                continue;
            }
            return Err(AppError::OAuth(format!(
                "{url} returned {status}: {}{}",
                body.error.as_deref().unwrap_or("unknown_error"),
                body.error_description.map(|d| format!(" ({d})")).unwrap_or_default()
            )));
        }
        Err(AppError::OAuth(format!("{url}: DPoP nonce retry exhausted")))
    }
}

fn session_from_tokens(
    tokens: TokenResponse,
    pds: String,
    auth_server: AuthServerMetadata,
    dpop_key: DpopKey,
    dpop_nonce: Option<String>,
) -> Result<SavedSession, AppError> {
    if !tokens.token_type.eq_ignore_ascii_case("DPoP") {
        return Err(AppError::OAuth(format!("unexpected token type {}", tokens.token_type)));
    }
    let scope = tokens.scope.unwrap_or_else(|| SCOPE.to_string());
    if !scope.split_whitespace().any(|s| s == "atproto") {
        return Err(AppError::OAuth(format!("granted scope '{scope}' lacks atproto")));
    }
    Ok(SavedSession {
        did: tokens.sub,
        pds,
        auth_server,
        dpop_key,
        dpop_nonce,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type,
        scope,
        expires_at: tokens.expires_in.map(|secs| Utc::now().timestamp() + secs),
    })
}
