//! Client keypair: P-256, persisted under `work_dir/keys/`.
//!
//! ```text
//! keys/
//! ├── client_p256       (32-byte secret scalar, mode 0600)
//! └── client_p256.pub   (65-byte uncompressed SEC1 point, mode 0644)
//! ```
//!
//! `kid` is the first 8 hex characters of `SHA256(public_point)`.

use std::fs;
use std::path::{Path, PathBuf};

use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::info;

use super::public_jwk;
use crate::error::AppError;

const KEYS_DIR: &str = "keys";
const SECRET_FILE: &str = "client_p256";
const PUBLIC_FILE: &str = "client_p256.pub";

#[derive(Clone)]
pub struct ClientKeys {
    pub kid: String,
    pub dir: PathBuf,
    signing_key: SigningKey,
}

impl std::fmt::Debug for ClientKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeys").field("kid", &self.kid).field("dir", &self.dir).finish()
    }
}

impl ClientKeys {
    /// Load the keypair under `work_dir`, generating one on first run.
    pub fn load_or_create(work_dir: &Path) -> Result<Self, AppError> {
        let dir = work_dir.join(KEYS_DIR);
        let signing_key = if dir.join(SECRET_FILE).exists() {
            load_keypair(&dir)?
        } else {
            let key = SigningKey::random(&mut OsRng);
            fs::create_dir_all(&dir)
                .map_err(|e| AppError::OAuth(format!("cannot create keys dir: {e}")))?;
            save_keypair(&dir, &key)?;
            info!(dir = %dir.display(), "generated client keypair");
            key
        };
        Ok(Self { kid: compute_kid(&public_point(&signing_key)), dir, signing_key })
    }

    /// Public JWK set served at `/jwks.json`.
    pub fn jwks(&self) -> Value {
        let mut jwk = public_jwk(&self.signing_key);
        jwk["kid"] = json!(self.kid);
        jwk["alg"] = json!("ES256");
        jwk["use"] = json!("sig");
        json!({ "keys": [jwk] })
    }
}

fn public_point(key: &SigningKey) -> Vec<u8> {
    p256::PublicKey::from(key.verifying_key())
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}

pub fn compute_kid(public_point: &[u8]) -> String {
    let digest = Sha256::digest(public_point);
    hex::encode(digest)[..8].to_string()
}

fn save_keypair(dir: &Path, key: &SigningKey) -> Result<(), AppError> {
    let secret_path = dir.join(SECRET_FILE);
    let pub_path = dir.join(PUBLIC_FILE);

    fs::write(&secret_path, key.to_bytes())
        .map_err(|e| AppError::OAuth(format!("cannot write {SECRET_FILE}: {e}")))?;
    fs::write(&pub_path, public_point(key))
        .map_err(|e| AppError::OAuth(format!("cannot write {PUBLIC_FILE}: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&secret_path, fs::Permissions::from_mode(0o600))
            .map_err(|e| AppError::OAuth(format!("cannot set permissions on {SECRET_FILE}: {e}")))?;
        fs::set_permissions(&pub_path, fs::Permissions::from_mode(0o644))
            .map_err(|e| AppError::OAuth(format!("cannot set permissions on {PUBLIC_FILE}: {e}")))?;
    }

    Ok(())
}

fn load_keypair(dir: &Path) -> Result<SigningKey, AppError> {
    let secret = fs::read(dir.join(SECRET_FILE))
        .map_err(|e| AppError::OAuth(format!("cannot read {SECRET_FILE}: {e}")))?;
    let key = SigningKey::from_slice(&secret)
        .map_err(|_| AppError::OAuth(format!("{SECRET_FILE} is not a P-256 secret key")))?;

    // The public half is informational, but a mismatch means the pair was tampered with.
    if let Ok(stored) = fs::read(dir.join(PUBLIC_FILE)) {
        if stored != public_point(&key) {
            return Err(AppError::OAuth(
                "keypair mismatch: public key does not match secret key".into(),
            ));
        }
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_then_reloads_same_key() {
        let tmp = TempDir::new().unwrap();
        let first = ClientKeys::load_or_create(tmp.path()).unwrap();
        let second = ClientKeys::load_or_create(tmp.path()).unwrap();
        assert_eq!(first.kid, second.kid);
        assert_eq!(first.kid.len(), 8);
        assert_eq!(first.jwks(), second.jwks());
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let keys = ClientKeys::load_or_create(tmp.path()).unwrap();
        let mode = fs::metadata(keys.dir.join(SECRET_FILE)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let keys = ClientKeys::load_or_create(tmp.path()).unwrap();
        let other = SigningKey::random(&mut OsRng);
        fs::write(keys.dir.join(PUBLIC_FILE), public_point(&other)).unwrap();
        assert!(ClientKeys::load_or_create(tmp.path()).is_err());
    }

    #[test]
    fn jwks_shape() {
        let tmp = TempDir::new().unwrap();
        let keys = ClientKeys::load_or_create(tmp.path()).unwrap();
        let jwks = keys.jwks();
        let key = &jwks["keys"][0];
        assert_eq!(key["kty"], "EC");
        assert_eq!(key["crv"], "P-256");
        assert_eq!(key["kid"], keys.kid.as_str());
        assert!(key.get("d").is_none());
    }
}
