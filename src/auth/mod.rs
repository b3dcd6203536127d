use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use argon2::password_hash::{SaltString, rand_core::OsRng};
use chrono::Duration;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{AppError, Result};

pub mod admin;
pub mod session;
pub mod storage;

pub use admin::{AdminAuthGuard, AdminLoginError, AdminState};
pub use session::{RestoreOutcome, SessionState, SessionStore};
pub use storage::{SessionStorage, TabStorage};

/// Contestant-facing authentication failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Bad credentials; the message never says which half was wrong.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Could not reach the contest server: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Rejected(String),
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        if err.is_transient() {
            AuthError::Unavailable(err.to_string())
        } else {
            AuthError::Rejected(err.to_string())
        }
    }
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    let argon2 = Argon2::default();

    Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(password_hash.to_string())
}

pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short stable identifier for a token, safe to put in logs.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

/// Configured minutes as a span, capped at the largest representable one.
pub(crate) fn minutes_or_max(minutes: i64) -> Duration {
    Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
}
