//! Client metadata document (`/api/client-metadata`).

use reqwest::Url;
use serde::Serialize;

use crate::error::AppError;

pub const CLIENT_NAME: &str = "ATgeo Marker";
pub const SCOPE: &str = "atproto transition:generic";
pub const REDIRECT_PATH: &str = "/api/auth/callback";
pub const METADATA_PATH: &str = "/api/client-metadata";
pub const JWKS_PATH: &str = "/jwks.json";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientMetadata {
    pub client_name: String,
    pub client_id: String,
    pub client_uri: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub application_type: String,
    pub token_endpoint_auth_method: String,
    pub dpop_bound_access_tokens: bool,
    pub jwks_uri: String,
}

impl ClientMetadata {
    /// Metadata for a client served from `public_url`.
    ///
    /// Loopback origins cannot host a fetchable metadata document, so their
    /// `client_id` carries scope and redirect in its query instead.
    pub fn for_public_url(public_url: &str) -> Result<Self, AppError> {
        let base = Url::parse(public_url)
            .map_err(|e| AppError::Config(format!("invalid public_url '{public_url}': {e}")))?;
        let join = |path: &str| -> Result<String, AppError> {
            base.join(path)
                .map(|u| u.to_string())
                .map_err(|e| AppError::Config(format!("cannot join {path} onto {public_url}: {e}")))
        };
        let redirect_uri = join(REDIRECT_PATH)?;

        let client_id = if is_loopback(&base) {
            let params = Url::parse_with_params(
                "http://localhost",
                &[("scope", SCOPE), ("redirect_uri", redirect_uri.as_str())],
            )
            .map_err(|e| AppError::Config(format!("loopback client_id: {e}")))?;
            format!("http://localhost?{}", params.query().unwrap_or_default())
        } else {
            join(METADATA_PATH)?
        };

        Ok(Self {
            client_name: CLIENT_NAME.into(),
            client_id,
            client_uri: base.to_string(),
            redirect_uris: vec![redirect_uri],
            scope: SCOPE.into(),
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            application_type: "web".into(),
            token_endpoint_auth_method: "none".into(),
            dpop_bound_access_tokens: true,
            jwks_uri: join(JWKS_PATH)?,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris.first().map(String::as_str).unwrap_or_default()
    }
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("127.0.0.1" | "localhost" | "[::1]"))
}
