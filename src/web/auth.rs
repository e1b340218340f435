//! Login, logout and the browser session cookie.

use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::WebState;
use crate::atproto::xrpc::Profile;
use crate::error::AppError;
use crate::oauth::{CallbackParams, ClientMetadata, OAuthSession};
use crate::store::WebSession;

pub const SESSION_COOKIE: &str = "atgeo_session";

// ── Cookie helpers ────────────────────────────────────────────────────────────

/// Value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

fn set_cookie(value: &str, max_age: Option<u32>, secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={age}"));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn redirect(location: &str, cookie: Option<String>) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(location)
            .map_err(|e| AppError::OAuth(format!("invalid redirect target: {e}")))?,
    );
    if let Some(cookie) = cookie {
        headers.insert(
            header::SET_COOKIE,
            HeaderValue::from_str(&cookie)
                .map_err(|e| AppError::Store(format!("invalid cookie value: {e}")))?,
        );
    }
    Ok((StatusCode::FOUND, headers).into_response())
}

/// The browser session behind the request's cookie and its OAuth session.
///
/// A web session whose tokens can no longer be refreshed is dropped.
pub async fn current_user(
    state: &WebState,
    headers: &HeaderMap,
) -> Result<(WebSession, OAuthSession), AppError> {
    let id = session_cookie(headers).ok_or_else(|| AppError::Unauthorized("not logged in".into()))?;
    let web = state
        .web_sessions
        .get(&id)?
        .ok_or_else(|| AppError::Unauthorized("session expired".into()))?;
    match state.oauth.restore(&web.did).await {
        Ok(session) => Ok((web, session)),
        Err(e @ (AppError::TokenRefresh(_) | AppError::Unauthorized(_))) => {
            debug!(did = %web.did, "dropping stale web session");
            state.web_sessions.del(&web.id)?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /api/client-metadata`
pub async fn client_metadata(State(state): State<WebState>) -> Json<ClientMetadata> {
    Json(state.oauth.metadata().clone())
}

/// `GET /jwks.json`, `GET /api/jwks`
pub async fn jwks(State(state): State<WebState>) -> Json<Value> {
    Json(state.oauth.jwks())
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    handle: String,
}

/// `POST /api/auth/login`: form or JSON `{ handle }`.
pub async fn login(State(state): State<WebState>, request: Request) -> Result<Response, AppError> {
    let headers = request.headers().clone();
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let input: LoginInput = if is_json {
        Json::<LoginInput>::from_request(request, &state)
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?
            .0
    } else {
        Form::<LoginInput>::from_request(request, &state)
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?
            .0
    };
    let handle = input.handle.trim();
    if handle.is_empty() {
        return Err(AppError::InvalidRequest("handle is required".into()));
    }

    if current_user(&state, &headers).await.is_ok() {
        return redirect("/", None);
    }

    let url = state.oauth.authorize(handle).await?;
    redirect(&url, None)
}

/// `GET /api/auth/callback`
pub async fn callback(
    State(state): State<WebState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let did = state.oauth.callback(&params).await?;
    let web = state.web_sessions.create(&did)?;
    info!(%did, "browser session created");
    redirect("/", Some(set_cookie(&web.id, None, state.cookie_secure)))
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<WebState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(id) = session_cookie(&headers) {
        if let Some(web) = state.web_sessions.get(&id)? {
            if let Err(e) = state.oauth.revoke(&web.did).await {
                warn!(did = %web.did, "revoke failed: {e}");
            }
            state.web_sessions.del_for_did(&web.did)?;
            info!(did = %web.did, "logged out");
        }
    }
    redirect("/", Some(set_cookie("", Some(0), state.cookie_secure)))
}

/// `GET /api/me`
pub async fn me(State(state): State<WebState>, headers: HeaderMap) -> Result<Json<Profile>, AppError> {
    let (web, _) = current_user(&state, &headers).await?;
    let profile = state.oauth.resolver().public_api().get_profile(&web.did).await?;
    Ok(Json(profile))
}
