//! DPoP (RFC 9449) proofs.
//!
//! Each OAuth session owns one ES256 key for its lifetime; the key is stored
//! with the session so restored sessions keep proving possession of the same
//! key their tokens are bound to.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use p256::ecdsa::SigningKey;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{b64url, public_jwk, sign_jwt};
use crate::error::AppError;

/// Header carrying the proof on requests, and the server's fresh nonce on responses.
pub const DPOP_HEADER: &str = "DPoP";
pub const NONCE_HEADER: &str = "DPoP-Nonce";
/// Error code a server returns when it wants the request retried with its nonce.
pub const USE_DPOP_NONCE: &str = "use_dpop_nonce";

#[derive(Clone)]
pub struct DpopKey {
    key: SigningKey,
}

impl std::fmt::Debug for DpopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DpopKey(..)")
    }
}

impl DpopKey {
    pub fn generate() -> Self {
        Self { key: SigningKey::random(&mut OsRng) }
    }

    pub fn public_jwk(&self) -> Value {
        public_jwk(&self.key)
    }

    /// Proof for `htm htu`. `access_token` adds the `ath` claim for resource
    /// requests; `nonce` echoes the server's latest `DPoP-Nonce`.
    pub fn proof(
        &self,
        htm: &str,
        htu: &str,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<String, AppError> {
        let header = json!({
            "typ": "dpop+jwt",
            "alg": "ES256",
            "jwk": self.public_jwk(),
        });
        let mut claims = json!({
            "jti": Uuid::new_v4().to_string(),
            "htm": htm,
            "htu": strip_query(htu),
            "iat": Utc::now().timestamp(),
        });
        if let Some(nonce) = nonce {
            claims["nonce"] = json!(nonce);
        }
        if let Some(token) = access_token {
            claims["ath"] = json!(b64url(Sha256::digest(token.as_bytes())));
        }
        sign_jwt(&self.key, &header, &claims)
    }
}

impl Serialize for DpopKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&b64url(self.key.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for DpopKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = URL_SAFE_NO_PAD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)?;
        let key = SigningKey::from_slice(&bytes).map_err(serde::de::Error::custom)?;
        Ok(Self { key })
    }
}

/// `htu` is the request URI without query and fragment.
fn strip_query(uri: &str) -> &str {
    uri.split(['?', '#']).next().unwrap_or(uri)
}
