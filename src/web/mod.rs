//! Browser-facing backend: OAuth login, marker creation, place search.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/client-metadata        OAuth client metadata
//! GET  /jwks.json, /api/jwks       client public keys
//! POST /api/auth/login             start login (form or JSON { handle })
//! GET  /api/auth/callback          finish login, set session cookie
//! POST /api/auth/logout            revoke and clear cookie
//! GET  /api/me                     signed-in profile
//! POST /api/markers                create a marker
//! GET  /api/locations/search?q=    Nominatim proxy
//! ```

pub mod auth;
pub mod markers;
pub mod nominatim;
pub mod uris;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::oauth::OAuthClient;
use crate::store::{Store, WebSessionStore};

use nominatim::NominatimClient;

const JSON_LIMIT_BYTES: usize = 100 * 1024;

/// Router state. Cheap to clone.
#[derive(Clone)]
pub struct WebState {
    pub oauth: Arc<OAuthClient>,
    pub web_sessions: WebSessionStore,
    pub nominatim: NominatimClient,
    pub cookie_secure: bool,
}

impl WebState {
    pub fn new(config: &Config, store: &Store) -> Result<Self, AppError> {
        Ok(Self {
            oauth: Arc::new(OAuthClient::new(config, store)?),
            web_sessions: store.web_sessions(),
            nominatim: NominatimClient::new(&config.nominatim, config.atproto.timeout_seconds)?,
            cookie_secure: config.web.cookie_secure,
        })
    }
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/api/client-metadata", get(auth::client_metadata))
        .route("/jwks.json", get(auth::jwks))
        .route("/api/jwks", get(auth::jwks))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/callback", get(auth::callback))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/me", get(auth::me))
        .route("/api/markers", post(markers::create_marker))
        .route("/api/locations/search", get(nominatim::search))
        .layer(DefaultBodyLimit::max(JSON_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store, bind and serve until `shutdown` is cancelled.
pub async fn serve(config: &Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let store = Store::open(&config.db_path)?;
    let state = WebState::new(config, &store)?;
    let client_id = state.oauth.metadata().client_id.clone();
    let router = build_router(state);

    let bind_addr = &config.web.bind;
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Config(format!("web bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, public_url = %config.web.public_url, %client_id, "web backend listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("web server error: {e}"))))?;

    info!("web backend shut down");
    Ok(())
}
