//! HMAC-signed, time-limited download links for blobs.
//!
//! A link has the form `{base}/blobs/{key}?expires={unix}&signature={sig}`
//! where `sig = base64url(HMAC-SHA256(secret, "{key}\n{expires}"))`.

use crate::models::operation::DownloadLink;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresignError {
    #[error("presign secret must not be empty")]
    InvalidSecret,
    #[error("link expiry is out of range")]
    ExpiryOutOfRange,
    #[error("link signature does not match")]
    BadSignature,
    #[error("link expired")]
    Expired,
}

/// Signs and verifies download links. The MAC is keyed once and cloned per link.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
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
    pub fn new(
        secret: impl AsRef<[u8]>,
        base_url: impl Into<String>,
    ) -> Result<Self, PresignError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(PresignError::InvalidSecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| PresignError::InvalidSecret)?;
        Ok(Self {
            mac,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Sign `key` for retrieval until `now + ttl`.
    pub fn sign(&self, key: &str, ttl: Duration) -> Result<DownloadLink, PresignError> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(PresignError::ExpiryOutOfRange)?;
        Ok(self.sign_until(key, expires_at))
    }

    pub fn sign_until(&self, key: &str, expires_at: DateTime<Utc>) -> DownloadLink {
        let expires = expires_at.timestamp();
        let signature = URL_SAFE_NO_PAD.encode(self.mac(key, expires).finalize().into_bytes());
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        DownloadLink {
            url: format!(
                "{}/blobs/{}?expires={}&signature={}",
                self.base_url, encoded_key, expires, signature
            ),
            expires_at,
        }
    }

    /// Check a presented `(key, expires, signature)` triple against `now`.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PresignError> {
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| PresignError::BadSignature)?;
        self.mac(key, expires)
            .verify_slice(&presented)
            .map_err(|_| PresignError::BadSignature)?;
        if now.timestamp() > expires {
            return Err(PresignError::Expired);
        }
        Ok(())
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}
