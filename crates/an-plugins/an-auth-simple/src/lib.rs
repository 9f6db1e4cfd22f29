//! # an-auth-simple
//!
//! Secret-keyed implementations of the security ports:
//!
//! * [`SimpleAuth`]: signed bearer tokens for registered users and
//!   time-bucketed anti-forgery nonces.
//! * [`AesEmailCipher`]: AES-256-GCM encryption of collaborator emails.
//!
//! Every key is derived from the server secret with SHA-256 under its own
//! label.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use an_core::{EmailCipher, PrimaryAuth};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Nonces rotate every 12 hours and stay valid for one extra period.
const NONCE_TICK_SECS: i64 = 12 * 60 * 60;
const NONCE_LEN: usize = 20;
const GCM_NONCE_LEN: usize = 12;

fn derive_key(secret: &str, label: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(b"|");
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

pub struct SimpleAuth {
    token_key: [u8; 32],
    nonce_key: [u8; 32],
}

impl SimpleAuth {
    pub fn new(server_secret: &str) -> Self {
        Self {
            token_key: derive_key(server_secret, "bearer"),
            nonce_key: derive_key(server_secret, "nonce"),
        }
    }

    fn sign(key: &[u8; 32], payload: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        mac
    }

    /// Bearer token for `user_id`: `<id>.<hex hmac>`.
    pub fn issue_token(&self, user_id: i64) -> String {
        let signature = Self::sign(&self.token_key, &user_id.to_string()).finalize().into_bytes();
        format!("{user_id}.{}", hex::encode(signature))
    }

    fn nonce_at(&self, subject: i64, tick: i64) -> String {
        let digest = Self::sign(&self.nonce_key, &format!("{subject}|{tick}"))
            .finalize()
            .into_bytes();
        let mut nonce = hex::encode(digest);
        nonce.truncate(NONCE_LEN);
        nonce
    }

    fn current_tick() -> i64 {
        Utc::now().timestamp().div_euclid(NONCE_TICK_SECS)
    }
}

#[async_trait]
impl PrimaryAuth for SimpleAuth {
    async fn authenticate(&self, bearer: &str) -> anyhow::Result<Option<i64>> {
        let Some((id, signature)) = bearer.trim().split_once('.') else {
            return Ok(None);
        };
        let Ok(user_id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let Ok(signature) = hex::decode(signature) else {
            return Ok(None);
        };
        if user_id <= 0 || Self::sign(&self.token_key, id).verify_slice(&signature).is_err() {
            debug!("bearer token rejected");
            return Ok(None);
        }
        Ok(Some(user_id))
    }

    fn issue_nonce(&self, user_id: i64) -> String {
        self.nonce_at(user_id, Self::current_tick())
    }

    fn verify_nonce(&self, user_id: i64, nonce: &str) -> bool {
        let tick = Self::current_tick();
        !nonce.is_empty() && (nonce == self.nonce_at(user_id, tick) || nonce == self.nonce_at(user_id, tick - 1))
    }
}

/// Output is standard base64 of a random 96-bit nonce followed by the
/// ciphertext and tag.
pub struct AesEmailCipher {
    cipher: Aes256Gcm,
}

impl AesEmailCipher {
    pub fn new(server_secret: &str) -> Self {
        let key = derive_key(server_secret, "email");
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }
}

impl EmailCipher for AesEmailCipher {
    fn encrypt(&self, email: &str) -> anyhow::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, email.as_bytes())
            .map_err(|e| anyhow::anyhow!("email encryption failed: {e}"))?;
        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, encrypted: &str) -> Option<String> {
        let raw = STANDARD.decode(encrypted.trim()).ok()?;
        if raw.len() <= GCM_NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(GCM_NONCE_LEN);
        let plain = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        String::from_utf8(plain).ok()
    }
}
