//! AT Protocol OAuth client: PAR + PKCE + DPoP, public-client flavour.
//!
//! ```text
//! keys             client keypair on disk, published as /jwks.json
//! metadata         client metadata document
//! pkce             verifier / S256 challenge
//! dpop             per-session proof-of-possession key and proofs
//! server_metadata  PDS → authorization server discovery
//! client           authorize / callback / restore / revoke
//! session          authenticated XRPC against the user's PDS
//! ```

pub mod client;
pub mod dpop;
pub mod keys;
pub mod metadata;
pub mod pkce;
pub mod server_metadata;
pub mod session;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::ecdsa::{Signature, SigningKey, signature::Signer};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::AppError;

pub use client::{CallbackParams, OAuthClient};
pub use keys::ClientKeys;
pub use metadata::ClientMetadata;
pub use session::OAuthSession;

pub(crate) fn b64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Public JWK (`kty: EC`, `crv: P-256`) for `key`.
pub(crate) fn public_jwk(key: &SigningKey) -> Value {
    let point = p256::PublicKey::from(key.verifying_key()).to_encoded_point(false);
    json!({
        "kty": "EC",
        "crv": "P-256",
        "x": b64url(point.x().map(|x| x.as_slice()).unwrap_or_default()),
        "y": b64url(point.y().map(|y| y.as_slice()).unwrap_or_default()),
    })
}

/// Compact ES256 JWS over `header.claims`.
pub(crate) fn sign_jwt<H: Serialize, C: Serialize>(
    key: &SigningKey,
    header: &H,
    claims: &C,
) -> Result<String, AppError> {
    let header = serde_json::to_vec(header).map_err(|e| AppError::OAuth(format!("jwt header: {e}")))?;
    let claims = serde_json::to_vec(claims).map_err(|e| AppError::OAuth(format!("jwt claims: {e}")))?;
    let signing_input = format!("{}.{}", b64url(header), b64url(claims));
    let signature: Signature = key.sign(signing_input.as_bytes());
    Ok(format!("{signing_input}.{}", b64url(signature.to_bytes())))
}
