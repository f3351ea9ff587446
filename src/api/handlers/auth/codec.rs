//! Signed, self-contained session tokens.
//!
//! Token format (URL- and cookie-safe, no padding):
//!   `<b64url(payload_json)>.<b64url(hmac_sha256(secret, b64url(payload_json)))>`
//!
//! The MAC covers the *encoded* payload segment, so verification never has to
//! re-serialize anything. Verification fails closed: every malformed, forged or
//! expired token collapses to `None`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{fmt, time::Duration};

use super::utils::epoch_millis;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const FALLBACK_SECRET: &str = "dev-secret";
const SEGMENT_SEPARATOR: char = '.';

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session signing key")]
    InvalidKey,
    #[error("failed to encode session payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Identity and expiry carried inside a session token.
///
/// Field order is part of the wire format: `{"user":..,"exp":..}`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionPayload {
    pub user: String,
    #[serde(rename = "exp")]
    pub expires_at_millis: i64,
}

impl SessionPayload {
    #[must_use]
    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        now_millis < self.expires_at_millis
    }
}

// Decoded leniently so a missing field is a rejection, not a parse panic.
#[derive(Deserialize)]
struct DecodedPayload {
    user: Option<String>,
    exp: Option<i64>,
}

pub struct SessionCodec {
    mac: HmacSha256,
    fallback_secret: bool,
    ttl: Duration,
}

impl SessionCodec {
    /// Build a codec keyed with `secret`.
    ///
    /// A missing or empty secret selects the development fallback key; check
    /// [`Self::uses_fallback_secret`] and warn loudly when that happens.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidKey` if the MAC rejects the key.
    pub fn new(secret: Option<&SecretString>, ttl: Duration) -> Result<Self, SessionError> {
        let secret = secret
            .map(|secret| secret.expose_secret())
            .filter(|value| !value.is_empty());
        let fallback_secret = secret.is_none();
        let key = secret.unwrap_or(FALLBACK_SECRET);
        let mac =
            HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| SessionError::InvalidKey)?;
        Ok(Self {
            mac,
            fallback_secret,
            ttl,
        })
    }

    #[must_use]
    pub fn uses_fallback_secret(&self) -> bool {
        self.fallback_secret
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Payload for `user` expiring one session lifetime from now.
    #[must_use]
    pub fn create_payload(&self, user: &str) -> SessionPayload {
        self.create_payload_at(user, epoch_millis())
    }

    #[must_use]
    pub fn create_payload_at(&self, user: &str, now_millis: i64) -> SessionPayload {
        let ttl_millis = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        SessionPayload {
            user: user.trim().to_string(),
            expires_at_millis: now_millis.saturating_add(ttl_millis),
        }
    }

    /// Serialize and sign `payload` into a cookie-ready token.
    ///
    /// # Errors
    /// Returns `SessionError::Encode` if the payload cannot be serialized.
    pub fn sign(&self, payload: &SessionPayload) -> Result<String, SessionError> {
        let json = serde_json::to_vec(payload)?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.signature(encoded.as_bytes()));
        Ok(format!("{encoded}{SEGMENT_SEPARATOR}{signature}"))
    }

    /// Return the trimmed identity carried by `token`, or `None` if the token
    /// is malformed, forged or expired.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<String> {
        self.verify_at(token, epoch_millis())
    }

    #[must_use]
    pub fn verify_at(&self, token: &str, now_millis: i64) -> Option<String> {
        let (encoded, signature) = token.split_once(SEGMENT_SEPARATOR)?;
        if encoded.is_empty() {
            return None;
        }

        // Non-canonical base64 (stray trailing bits, padding) is rejected here.
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let decoded: DecodedPayload = serde_json::from_slice(&json).ok()?;
        let payload = SessionPayload {
            user: decoded.user?.trim().to_string(),
            expires_at_millis: decoded.exp?,
        };

        if payload.user.is_empty() || !payload.is_valid_at(now_millis) {
            return None;
        }
        Some(payload.user)
    }

    fn signature(&self, encoded: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(encoded);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec")
            .field("secret", &"***")
            .field("fallback_secret", &self.fallback_secret)
            .field("ttl", &self.ttl)
            .finish()
    }
}
