//! The AppView's own DID document, served at `/.well-known/did.json`.

use serde_json::{Value, json};

use crate::error::AppError;

pub const APPVIEW_SERVICE_ID: &str = "#geomarker_appview";
pub const APPVIEW_SERVICE_TYPE: &str = "GeomarkerAppView";

/// Build the DID document advertising this AppView.
pub fn did_manifest(did: &str, service_endpoint: &str, public_key_multibase: &str) -> Value {
    json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/multikey/v1",
            "https://w3id.org/security/suites/secp256k1-2019/v1",
        ],
        "id": did,
        "verificationMethod": [{
            "id": format!("{did}#atproto"),
            "type": "Multikey",
            "controller": did,
            "publicKeyMultibase": public_key_multibase,
        }],
        "service": [{
            "id": APPVIEW_SERVICE_ID,
            "type": APPVIEW_SERVICE_TYPE,
            "serviceEndpoint": service_endpoint,
        }],
    })
}

/// An explicit endpoint wins; otherwise a `did:web` DID names its own host.
pub fn service_endpoint_for(did: &str, explicit: Option<&str>) -> Result<String, AppError> {
    if let Some(endpoint) = explicit.filter(|e| !e.trim().is_empty()) {
        return Ok(endpoint.trim().trim_end_matches('/').to_string());
    }
    match did.strip_prefix("did:web:") {
        Some(host) if !host.is_empty() => Ok(format!("https://{host}")),
        _ => Err(AppError::Config(
            "MARKER_APPVIEW_SERVICE_ENDPOINT is not set and MARKER_APPVIEW_DID is not a did:web"
                .into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_shape() {
        let doc = did_manifest("did:web:geo.example.com", "https://geo.example.com", "zQ3shkey");
        assert_eq!(doc["id"], "did:web:geo.example.com");
        assert_eq!(doc["@context"].as_array().unwrap().len(), 3);
        let vm = &doc["verificationMethod"][0];
        assert_eq!(vm["id"], "did:web:geo.example.com#atproto");
        assert_eq!(vm["type"], "Multikey");
        assert_eq!(vm["publicKeyMultibase"], "zQ3shkey");
        let svc = &doc["service"][0];
        assert_eq!(svc["id"], "#geomarker_appview");
        assert_eq!(svc["type"], "GeomarkerAppView");
        assert_eq!(svc["serviceEndpoint"], "https://geo.example.com");
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(
            service_endpoint_for("did:web:geo.example.com", None).unwrap(),
            "https://geo.example.com"
        );
        assert_eq!(
            service_endpoint_for("did:plc:abc", Some("https://appview.test/")).unwrap(),
            "https://appview.test"
        );
        assert!(service_endpoint_for("did:plc:abc", None).is_err());
        assert!(service_endpoint_for("did:plc:abc", Some("  ")).is_err());
    }
}
