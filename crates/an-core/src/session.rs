//! # Collaborator Session
//!
//! Self-contained signed cookie identifying an external collaborator. No server
//! side session table: the value carries the collaborator id and expiry, signed
//! with HMAC-SHA256 under a key derived from the server secret.
//!
//! Wire form: `base64("<id>|<expires_unix>|<hex hmac of "<id>|<expires_unix>">")`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "annotate_collaborator_session";
pub const DEFAULT_LIFETIME_DAYS: i64 = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session value is malformed")]
    Malformed,
    #[error("session signature does not match")]
    BadSignature,
    #[error("session expired")]
    Expired,
}

/// A verified session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub collaborator_id: i64,
    pub expires: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionSigner {
    key: [u8; 32],
    lifetime: Duration,
}

impl SessionSigner {
    /// `lifetime_days` below one is raised to one day.
    pub fn new(server_secret: &str, lifetime_days: i64) -> Self {
        let key: [u8; 32] = Sha256::digest(server_secret.as_bytes()).into();
        Self {
            key,
            lifetime: Duration::days(lifetime_days.max(1)),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        mac
    }

    /// Signs a session starting at `now`. Returns `None` for non-positive ids.
    pub fn issue(&self, collaborator_id: i64, now: DateTime<Utc>) -> Option<(String, Session)> {
        if collaborator_id <= 0 {
            return None;
        }
        let expires = now + self.lifetime;
        let payload = format!("{collaborator_id}|{}", expires.timestamp());
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());
        let value = STANDARD.encode(format!("{payload}|{signature}"));
        let session = Session {
            collaborator_id,
            expires: Utc.timestamp_opt(expires.timestamp(), 0).single()?,
        };
        Some((value, session))
    }

    pub fn verify(&self, value: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let decoded = STANDARD.decode(value.trim()).map_err(|_| SessionError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| SessionError::Malformed)?;
        let mut parts = decoded.split('|');
        let (Some(id), Some(expires), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        let signature = hex::decode(signature).map_err(|_| SessionError::BadSignature)?;
        self.mac(&format!("{id}|{expires}"))
            .verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let collaborator_id: i64 = id.parse().map_err(|_| SessionError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| SessionError::Malformed)?;
        if collaborator_id <= 0 {
            return Err(SessionError::Malformed);
        }
        if now.timestamp() > expires {
            return Err(SessionError::Expired);
        }
        let expires = Utc.timestamp_opt(expires, 0).single().ok_or(SessionError::Malformed)?;
        Ok(Session {
            collaborator_id,
            expires,
        })
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
