//! Password hashing with argon2id
//!
//! Hashing and verification are CPU-bound, so both run on the
//! blocking thread pool instead of a runtime worker.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::SaltString,
};
use thiserror::Error;

/// Errors raised while hashing or verifying a password
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Salted, adaptive password hasher
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password into a PHC string
    pub async fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let argon2 = self.argon2();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut rand::rngs::OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| CredentialError::Hash(e.to_string()))
        })
        .await?
    }

    /// Check a candidate password against a stored PHC string
    pub async fn verify(
        &self,
        stored_hash: &str,
        candidate: &str,
    ) -> Result<bool, CredentialError> {
        let argon2 = self.argon2();
        let stored_hash = stored_hash.to_owned();
        let candidate = candidate.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored_hash)
                .map_err(|e| CredentialError::MalformedHash(e.to_string()))?;
            Ok(argon2.verify_password(candidate.as_bytes(), &parsed).is_ok())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("pw1").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "pw1").await.unwrap());
        assert!(!hasher.verify(&hash, "pw2").await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = PasswordHasher::new();
        let first = hasher.hash("same").await.unwrap();
        let second = hasher.hash("same").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_an_error() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("not-a-phc-string", "pw").await;

        assert!(matches!(result, Err(CredentialError::MalformedHash(_))));
    }

    #[test]
    fn test_cost_is_not_minimal() {
        let params = PasswordHasher::new().params;
        assert!(params.m_cost() > Params::MIN_M_COST);
        assert!(params.t_cost() > Params::MIN_T_COST);
    }
}
