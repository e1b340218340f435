//! Identity resolution: handle → DID → DID document → PDS.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::xrpc::XrpcClient;
use crate::error::AppError;

const PDS_SERVICE_ID: &str = "#atproto_pds";
const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

/// The parts of a DID document this service reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub service: Vec<DidService>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidService {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub service_endpoint: serde_json::Value,
}

impl DidDocument {
    /// The `#atproto_pds` service endpoint.
    pub fn pds_endpoint(&self) -> Option<String> {
        self.service
            .iter()
            .find(|s| {
                (s.id == PDS_SERVICE_ID || s.id == format!("{}{PDS_SERVICE_ID}", self.id))
                    && s.kind == PDS_SERVICE_TYPE
            })
            .and_then(|s| s.service_endpoint.as_str())
            .map(|e| e.trim_end_matches('/').to_string())
    }

    /// First `at://` alias, i.e. the account's claimed handle.
    pub fn handle(&self) -> Option<&str> {
        self.also_known_as.iter().find_map(|a| a.strip_prefix("at://"))
    }
}

/// Resolved account identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub did: String,
    pub handle: Option<String>,
    pub pds: String,
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    http: Client,
    public_api: XrpcClient,
    plc_directory: String,
}

impl IdentityResolver {
    pub fn new(public_api: &str, plc_directory: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Xrpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            public_api: XrpcClient::with_client(http.clone(), public_api),
            http,
            plc_directory: plc_directory.trim_end_matches('/').to_string(),
        })
    }

    pub fn public_api(&self) -> &XrpcClient {
        &self.public_api
    }

    /// Handle or DID → DID. A leading `@` and `at://` are tolerated.
    pub async fn resolve_did(&self, input: &str) -> Result<String, AppError> {
        let input = normalize_actor(input)?;
        if input.starts_with("did:") {
            return Ok(input);
        }
        self.public_api.resolve_handle(&input).await
    }

    /// Fetch the DID document for `did:plc:` or `did:web:` DIDs.
    pub async fn did_document(&self, did: &str) -> Result<DidDocument, AppError> {
        let url = did_document_url(did, &self.plc_directory)?;
        debug!(%did, %url, "fetching DID document");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Xrpc(format!(
                "DID document for {did} returned {}",
                resp.status()
            )));
        }
        let doc: DidDocument = resp
            .json()
            .await
            .map_err(|e| AppError::Xrpc(format!("malformed DID document for {did}: {e}")))?;
        if doc.id != did {
            return Err(AppError::Xrpc(format!("DID document id {} does not match {did}", doc.id)));
        }
        Ok(doc)
    }

    /// Resolve a handle or DID all the way to its PDS.
    pub async fn resolve(&self, input: &str) -> Result<ResolvedIdentity, AppError> {
        let did = self.resolve_did(input).await?;
        let doc = self.did_document(&did).await?;
        let pds = doc
            .pds_endpoint()
            .ok_or_else(|| AppError::Xrpc(format!("{did} has no atproto PDS service")))?;
        Ok(ResolvedIdentity { handle: doc.handle().map(str::to_string), did, pds })
    }
}

/// Trim and strip the decorations users paste into login forms.
pub fn normalize_actor(input: &str) -> Result<String, AppError> {
    let s = input.trim();
    let s = s.strip_prefix("at://").unwrap_or(s);
    let s = s.strip_prefix('@').unwrap_or(s);
    if s.is_empty() || s.contains(char::is_whitespace) || s.contains('/') {
        return Err(AppError::InvalidRequest(format!("not a handle or DID: '{input}'")));
    }
    if s.starts_with("did:") {
        Ok(s.to_string())
    } else {
        Ok(s.to_lowercase())
    }
}

fn did_document_url(did: &str, plc_directory: &str) -> Result<String, AppError> {
    if did.starts_with("did:plc:") {
        Ok(format!("{plc_directory}/{did}"))
    } else if let Some(host) = did.strip_prefix("did:web:") {
        if host.is_empty() || host.contains(':') {
            return Err(AppError::InvalidRequest(format!("unsupported did:web form: {did}")));
        }
        Ok(format!("https://{host}/.well-known/did.json"))
    } else {
        Err(AppError::InvalidRequest(format!("unsupported DID method: {did}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_user_input() {
        assert_eq!(normalize_actor("  @Alice.BSKY.social ").unwrap(), "alice.bsky.social");
        assert_eq!(normalize_actor("at://did:plc:ABC").unwrap(), "did:plc:ABC");
        assert!(normalize_actor("").is_err());
        assert!(normalize_actor("two words").is_err());
    }

    #[test]
    fn document_urls_per_method() {
        assert_eq!(
            did_document_url("did:plc:abc", "https://plc.directory").unwrap(),
            "https://plc.directory/did:plc:abc"
        );
        assert_eq!(
            did_document_url("did:web:example.com", "https://plc.directory").unwrap(),
            "https://example.com/.well-known/did.json"
        );
        assert!(did_document_url("did:key:z6Mk", "https://plc.directory").is_err());
    }

    #[test]
    fn extracts_pds_and_handle() {
        let doc: DidDocument = serde_json::from_value(json!({
            "id": "did:plc:abc",
            "alsoKnownAs": ["at://alice.test"],
            "service": [
                { "id": "#bsky_fg", "type": "BskyFeedGenerator", "serviceEndpoint": "https://feed.test" },
                { "id": "#atproto_pds", "type": "AtprotoPersonalDataServer", "serviceEndpoint": "https://pds.test/" }
            ]
        }))
        .unwrap();
        assert_eq!(doc.pds_endpoint().as_deref(), Some("https://pds.test"));
        assert_eq!(doc.handle(), Some("alice.test"));
    }

    #[test]
    fn missing_pds_is_none() {
        let doc: DidDocument = serde_json::from_value(json!({ "id": "did:plc:abc" })).unwrap();
        assert!(doc.pds_endpoint().is_none());
        assert!(doc.handle().is_none());
    }
}
