//! Geomarker AppView: aggregates marker records into display-ready views.
//!
//! ## URL layout
//!
//! ```text
//! GET /xrpc/community.atprotocol.geomarker.getMarkers?owner=<did|handle>[&limit=][&cursor=]
//! GET /.well-known/did.json
//! GET /
//! ```

pub mod aggregate;
pub mod entries;
pub mod markers;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::Method,
    routing::get,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::atproto::did_doc::did_manifest;
use crate::atproto::{RepoReader, XrpcClient};
use crate::config::Config;
use crate::error::AppError;
use crate::lexicon::GET_MARKERS_NSID;

pub use aggregate::{Aggregator, GetMarkersOutput, GetMarkersParams};

/// JSON payloads above this are refused; the AppView takes no blobs.
const JSON_LIMIT_BYTES: usize = 100 * 1024;

const MAX_LIST_LIMIT: u32 = 100;

pub const LIVE_MESSAGE: &str = "The Geomarker AppView is live!";

/// Router state. Cheap to clone, all fields are reference-counted.
#[derive(Clone)]
pub struct AppViewState {
    pub aggregator: Arc<Aggregator>,
    pub did_document: Arc<Value>,
}

impl AppViewState {
    pub fn new(reader: Arc<dyn RepoReader>, config: &Config) -> Result<Self, AppError> {
        let (did, endpoint) = config.appview.identity()?;
        let public_key = config.appview.load_public_key()?;
        Ok(Self {
            aggregator: Arc::new(Aggregator::new(
                reader,
                config.appview.list_limit,
                config.appview.entry_concurrency,
            )),
            did_document: Arc::new(did_manifest(&did, &endpoint, &public_key)),
        })
    }
}

pub fn build_router(state: AppViewState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route(&format!("/xrpc/{GET_MARKERS_NSID}"), get(get_markers))
        .route("/.well-known/did.json", get(did_json))
        .route("/", get(|| async { LIVE_MESSAGE }))
        .layer(DefaultBodyLimit::max(JSON_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn serve(config: &Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let reader: Arc<dyn RepoReader> = Arc::new(XrpcClient::new(
        &config.appview.repo_service,
        config.appview.timeout_seconds,
    )?);
    let state = AppViewState::new(reader, config)?;
    let router = build_router(state);

    let bind_addr = &config.appview.bind;
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Config(format!("appview bind failed on {bind_addr}: {e}")))?;

    let (did, endpoint) = config.appview.identity()?;
    info!(%bind_addr, %did, %endpoint, repo_service = %config.appview.repo_service, "appview listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("appview server error: {e}"))))?;

    info!("appview shut down");
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Raw query, parsed by hand so bad values come back as XRPC errors.
#[derive(Debug, Deserialize)]
struct GetMarkersQuery {
    owner: Option<String>,
    limit: Option<String>,
    cursor: Option<String>,
}

impl GetMarkersQuery {
    fn into_params(self) -> Result<GetMarkersParams, AppError> {
        let owner = self
            .owner
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("Error: Params must have the property \"owner\"".into()))?;

        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=MAX_LIST_LIMIT).contains(&n) => Some(n),
                _ => {
                    return Err(AppError::InvalidRequest(format!(
                        "limit must be an integer between 1 and {MAX_LIST_LIMIT}"
                    )));
                }
            },
        };

        Ok(GetMarkersParams {
            owner,
            limit,
            cursor: self.cursor.filter(|c| !c.is_empty()),
        })
    }
}

async fn get_markers(
    State(state): State<AppViewState>,
    Query(query): Query<GetMarkersQuery>,
) -> Result<Json<GetMarkersOutput>, AppError> {
    let params = query.into_params()?;
    let out = state.aggregator.get_markers(&params).await?;
    Ok(Json(out))
}

async fn did_json(State(state): State<AppViewState>) -> Json<Value> {
    Json(state.did_document.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(owner: Option<&str>, limit: Option<&str>) -> GetMarkersQuery {
        GetMarkersQuery {
            owner: owner.map(str::to_string),
            limit: limit.map(str::to_string),
            cursor: None,
        }
    }

    #[test]
    fn owner_is_required() {
        assert!(query(None, None).into_params().is_err());
        assert!(query(Some("  "), None).into_params().is_err());
        let p = query(Some("did:plc:abc"), None).into_params().unwrap();
        assert_eq!(p.owner, "did:plc:abc");
        assert!(p.limit.is_none());
    }

    #[test]
    fn limit_bounds() {
        assert_eq!(query(Some("a.test"), Some("50")).into_params().unwrap().limit, Some(50));
        assert!(query(Some("a.test"), Some("0")).into_params().is_err());
        assert!(query(Some("a.test"), Some("101")).into_params().is_err());
        assert!(query(Some("a.test"), Some("ten")).into_params().is_err());
    }
}
