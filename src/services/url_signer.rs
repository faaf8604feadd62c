//! Time-bounded blob URLs served back by the catalog at `/blobs/{*key}`.
//!
//! A URL carries `expires` (unix seconds) and `sig`, the URL-safe base64
//! HMAC-SHA256 of `key \n expires` under the process secret.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signed url expired")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
    #[error("failed to initialize hmac")]
    InvalidSecret,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Signer with a random secret; its URLs die with the process.
    pub fn ephemeral(base_url: impl Into<String>) -> Self {
        let mut secret = Vec::with_capacity(32);
        secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self::new(secret, base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Unsigned link to `key` under the blob route.
    pub fn blob_url(&self, key: &str) -> String {
        format!("{}/blobs/{}", self.base_url, encode_key(key))
    }

    pub fn sign_url(&self, key: &str, ttl: Duration) -> Result<String, SignatureError> {
        let expires = unix_now().saturating_add(ttl.as_secs());
        let sig = self.signature(key, expires)?;
        Ok(format!("{}?expires={expires}&sig={sig}", self.blob_url(key)))
    }

    /// Check a signature produced by `sign_url`.
    pub fn verify(&self, key: &str, expires: u64, sig: &str) -> Result<(), SignatureError> {
        if expires < unix_now() {
            return Err(SignatureError::Expired);
        }
        let provided = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| SignatureError::Mismatch)?;
        self.mac(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }

    fn signature(&self, key: &str, expires: u64) -> Result<String, SignatureError> {
        let bytes = self.mac(key, expires)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    fn mac(&self, key: &str, expires: u64) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }
}

/// Percent-encode each `/`-separated segment of a blob key.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
