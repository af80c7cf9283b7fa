//! Two-tier credentials.
//!
//! Bearer keys (`uk_live_` + 32 hex) carry admin or single-app CI privilege
//! and gate the whole admin surface. Public SDK keys (`pk_<slug>_` + 16 hex)
//! are shipped inside client apps and can only ingest feedback and crashes.
//!
//! Plaintext is returned exactly once, at creation; only SHA-256 hashes are
//! stored. Successful authentication bumps `last_used_at` in a detached task
//! that logs failures and never surfaces them.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ApiError;
use crate::storage::keys::{ApiKeyRow, KeyStore, PublicApiKeyRow};

pub const BEARER_PREFIX: &str = "uk_live_";
pub const PUBLIC_PREFIX: &str = "pk_";

/// Chars of plaintext stored as `key_prefix` for dashboard display.
const PUBLIC_DISPLAY_PREFIX_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    Admin,
    Ci,
}

impl KeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Ci => "ci",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "admin" => Ok(Self::Admin),
            "ci" => Ok(Self::Ci),
            other => Err(ApiError::validation(format!("unknown key scope '{other}'"))),
        }
    }
}

/// An authenticated bearer key, attached to admin requests.
#[derive(Debug, Clone)]
pub struct AuthedKey {
    pub id: String,
    pub scope: KeyScope,
    /// Present iff scope = ci; the only app this key may act on.
    pub app_id: Option<String>,
}

impl AuthedKey {
    /// CI keys may only touch resources beneath their bound app.
    pub fn ensure_app_access(&self, app_id: &str) -> Result<(), ApiError> {
        match self.scope {
            KeyScope::Admin => Ok(()),
            KeyScope::Ci => match &self.app_id {
                Some(bound) if bound == app_id => Ok(()),
                _ => Err(ApiError::forbidden(
                    "CI key is not authorized for this app",
                )),
            },
        }
    }

    /// Operations with no app scope (key management, app creation) are
    /// admin-only.
    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        match self.scope {
            KeyScope::Admin => Ok(()),
            KeyScope::Ci => Err(ApiError::forbidden("admin scope required")),
        }
    }
}

/// An authenticated SDK key: `(key_id, app_id)`.
#[derive(Debug, Clone)]
pub struct SdkIdentity {
    pub key_id: String,
    pub app_id: String,
}

pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// `uk_live_` + 32 hex chars (16 random bytes).
pub fn generate_bearer_plaintext() -> String {
    format!("{BEARER_PREFIX}{}", random_hex(16))
}

/// `pk_<slug>_` + 16 hex chars (8 random bytes). The slug is informational
/// only; authorization binds to the stored `app_id` via hash lookup.
pub fn generate_public_plaintext(app_slug: &str) -> String {
    format!("{PUBLIC_PREFIX}{app_slug}_{}", random_hex(8))
}

#[derive(Clone)]
pub struct KeyService {
    store: KeyStore,
}

impl KeyService {
    pub fn new(store: KeyStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Mint an admin or CI bearer key. The plaintext in the return value is
    /// the only copy that will ever exist.
    pub async fn create_bearer_key(
        &self,
        name: &str,
        scope: KeyScope,
        app_id: Option<&str>,
    ) -> Result<(String, ApiKeyRow), ApiError> {
        match scope {
            KeyScope::Ci if app_id.is_none() => {
                return Err(ApiError::validation("ci keys must be bound to an app"));
            }
            KeyScope::Admin if app_id.is_some() => {
                return Err(ApiError::validation("admin keys are not app-scoped"));
            }
            _ => {}
        }

        let plaintext = generate_bearer_plaintext();
        let row = self
            .store
            .insert_api_key(name, &hash_key(&plaintext), scope.as_str(), app_id)
            .await?;
        Ok((plaintext, row))
    }

    /// Mint a per-app SDK key.
    pub async fn create_public_key(
        &self,
        app_id: &str,
        app_slug: &str,
        name: &str,
    ) -> Result<(String, PublicApiKeyRow), ApiError> {
        let plaintext = generate_public_plaintext(app_slug);
        let prefix_len = plaintext.len().min(PUBLIC_DISPLAY_PREFIX_LEN);
        let row = self
            .store
            .insert_public_key(app_id, name, &hash_key(&plaintext), &plaintext[..prefix_len])
            .await?;
        Ok((plaintext, row))
    }

    /// Authenticate an `Authorization: Bearer` token. Only `uk_live_` tokens
    /// are considered; anything else is rejected before touching the DB.
    pub async fn authenticate_bearer(&self, token: &str) -> Result<Option<AuthedKey>, ApiError> {
        if !token.starts_with(BEARER_PREFIX) {
            return Ok(None);
        }
        let Some(row) = self.store.find_api_key_by_hash(&hash_key(token)).await? else {
            return Ok(None);
        };

        self.spawn_touch_bearer(row.id.clone());
        let scope = KeyScope::parse(&row.scope)?;
        Ok(Some(AuthedKey {
            id: row.id,
            scope,
            app_id: row.app_id,
        }))
    }

    /// Authenticate an `X-API-Key` SDK token. The slug embedded in the
    /// plaintext is never trusted — authority comes from the stored app_id.
    pub async fn authenticate_public(&self, token: &str) -> Result<Option<SdkIdentity>, ApiError> {
        if !token.starts_with(PUBLIC_PREFIX) {
            return Ok(None);
        }
        let Some(row) = self.store.find_public_key_by_hash(&hash_key(token)).await? else {
            return Ok(None);
        };

        self.spawn_touch_public(row.id.clone());
        Ok(Some(SdkIdentity {
            key_id: row.id,
            app_id: row.app_id,
        }))
    }

    fn spawn_touch_bearer(&self, id: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_api_key(&id).await {
                warn!(key_id = %id, err = %e, "failed to update key last_used_at");
            }
        });
    }

    fn spawn_touch_public(&self, id: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_public_key(&id).await {
                warn!(key_id = %id, err = %e, "failed to update SDK key last_used_at");
            }
        });
    }
}

/// Lenient shape check for an app's update-verification key.
///
/// Tauri updater keys are base64-encoded; a well-formed Ed25519 key decodes
/// to 32 bytes. Unknown shapes are accepted (values migrated from older
/// deployments must keep working) but logged.
pub fn check_public_key_shape(value: &str) -> Result<(), ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("public_key must not be empty"));
    }
    if !trimmed.is_ascii() {
        return Err(ApiError::validation("public_key must be ASCII"));
    }
    use base64::Engine as _;
    match base64::engine::general_purpose::STANDARD.decode(trimmed) {
        Ok(bytes) if bytes.len() == 32 => {}
        _ => warn!("app public_key is not a 32-byte base64 value — storing as-is"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_plaintext_format() {
        let k = generate_bearer_plaintext();
        assert!(k.starts_with("uk_live_"));
        assert_eq!(k.len(), "uk_live_".len() + 32);
        assert!(k["uk_live_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn public_plaintext_format() {
        let k = generate_public_plaintext("note");
        assert!(k.starts_with("pk_note_"));
        assert_eq!(k.len(), "pk_note_".len() + 16);
    }

    #[test]
    fn hashes_are_stable_hex_sha256() {
        let h = hash_key("uk_live_00");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_key("uk_live_00"));
        assert_ne!(h, hash_key("uk_live_01"));
    }

    #[test]
    fn ci_scope_enforcement() {
        let admin = AuthedKey {
            id: "k1".into(),
            scope: KeyScope::Admin,
            app_id: None,
        };
        assert!(admin.ensure_app_access("any").is_ok());
        assert!(admin.ensure_admin().is_ok());

        let ci = AuthedKey {
            id: "k2".into(),
            scope: KeyScope::Ci,
            app_id: Some("app-1".into()),
        };
        assert!(ci.ensure_app_access("app-1").is_ok());
        assert!(ci.ensure_app_access("app-2").is_err());
        assert!(ci.ensure_admin().is_err());
    }

    #[test]
    fn public_key_shape_is_lenient() {
        // 32 zero bytes, base64.
        let good = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            [0u8; 32],
        );
        assert!(check_public_key_shape(&good).is_ok());
        // Unknown shape: accepted, only logged.
        assert!(check_public_key_shape("dW5rbm93bg==").is_ok());
        // Empty: rejected.
        assert!(check_public_key_shape("  ").is_err());
    }
}
