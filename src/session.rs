//! Credential lifecycle: issued by `login`, kept in a small JSON file, cleared by
//! `logout`. Commands that talk to protected endpoints go through [`require`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub email: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// Read from the token's `exp` claim when the token is a JWT.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn issue(token: impl Into<String>, email: Option<String>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token);
        Self {
            token,
            email,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Reads `exp` without verifying the signature; the server stays the authority.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    #[derive(Deserialize)]
    struct Claims {
        exp: Option<i64>,
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp?, 0)
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let credential = serde_json::from_str(&contents)?;
        Ok(Some(credential))
    }

    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(credential)?)?;
        info!(path = %self.path.display(), "Credential stored");
        Ok(())
    }

    /// Returns whether a credential was present.
    pub fn clear(&self) -> Result<bool, AuthError> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "Credential removed");
        Ok(true)
    }
}

/// The route gate: a credential must exist and must not be known to be expired.
pub fn require(store: &CredentialStore, now: DateTime<Utc>) -> Result<Credential, AuthError> {
    let credential = store.load()?.ok_or(AuthError::MissingToken)?;
    match credential.expires_at {
        Some(expires_at) if credential.is_expired_at(now) => Err(AuthError::Expired(expires_at)),
        _ => Ok(credential),
    }
}
