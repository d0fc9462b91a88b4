//! Argon2id password hashing and the password strength policy.
//!
//! Hashing is CPU-bound, so both directions run on tokio's blocking pool and never on the
//! request-handling workers.

use crate::{config::Argon2Config, error::AppError};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::Arc;
use tokio::task;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// validate_strength
///
/// At least [`MIN_PASSWORD_LEN`] characters, at most [`MAX_PASSWORD_LEN`], with at least one
/// letter and one digit.
pub fn validate_strength(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("must be at most {MAX_PASSWORD_LEN} characters"),
        ));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AppError::validation(
            "password",
            "must contain at least one letter and one digit",
        ));
    }
    Ok(())
}

/// PasswordHasher
///
/// Argon2id with configurable cost. Cheap to clone; clones share the decoy hash used to keep
/// unknown-email logins as slow as wrong-password logins.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    decoy: Arc<str>,
}

impl PasswordHasher {
    /// Builds the hasher and computes the decoy hash up front, so the first unknown-email
    /// login costs one verification like every later one.
    pub fn new(config: &Argon2Config) -> Result<Self, AppError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid Argon2 params: {e}")))?;
        let decoy = Self::hash_blocking(params.clone(), "decoy-password-0")?;
        Ok(Self {
            params,
            decoy: decoy.into(),
        })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    fn hash_blocking(params: Params, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        Self::argon2(params)
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
    }

    fn verify_blocking(params: Params, password: &str, phc: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(phc)
            .map_err(|e| AppError::Internal(format!("invalid password hash format: {e}")))?;
        // The PHC string carries its own parameters; `params` only matters for new hashes.
        Ok(Self::argon2(params)
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Hashes `password` with a fresh random salt.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let params = self.params.clone();
        let password = password.to_string();
        task::spawn_blocking(move || Self::hash_blocking(params, &password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task panicked: {e}")))?
    }

    /// Checks `password` against a stored PHC string.
    pub async fn verify(&self, password: &str, phc: &str) -> Result<bool, AppError> {
        let params = self.params.clone();
        let password = password.to_string();
        let phc = phc.to_string();
        task::spawn_blocking(move || Self::verify_blocking(params, &password, &phc))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task panicked: {e}")))?
    }

    /// verify_decoy
    ///
    /// Runs a full verification against a throwaway hash and always reports a mismatch.
    /// Called when the account does not exist so the response time matches a wrong password.
    pub async fn verify_decoy(&self, password: &str) -> Result<bool, AppError> {
        let params = self.params.clone();
        let decoy = self.decoy.clone();
        let password = password.to_string();
        task::spawn_blocking(move || {
            Self::verify_blocking(params, &password, &decoy)?;
            Ok(false)
        })
        .await
        .map_err(|e| AppError::Internal(format!("password verification task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&AppConfig::default().argon2).unwrap()
    }

    #[test]
    fn strength_policy() {
        assert!(validate_strength("abc123").is_err());
        assert!(validate_strength("abcdefghij").is_err());
        assert!(validate_strength("1234567890").is_err());
        assert!(validate_strength("correct-horse-1").is_ok());
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let h = hasher();
        let phc = h.hash("s3cret-password").await.unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(h.verify("s3cret-password", &phc).await.unwrap());
        assert!(!h.verify("s3cret-passwore", &phc).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let h = hasher();
        let a = h.hash("s3cret-password").await.unwrap();
        let b = h.hash("s3cret-password").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decoy_hash_is_computed_at_construction() {
        let h = hasher();
        assert!(h.decoy.starts_with("$argon2id$"));
        assert!(Arc::ptr_eq(&h.decoy, &h.clone().decoy));
    }

    #[tokio::test]
    async fn decoy_never_matches() {
        let h = hasher();
        assert!(!h.verify_decoy("decoy-password-0").await.unwrap());
        assert!(!h.verify_decoy("anything-1").await.unwrap());
    }
}
