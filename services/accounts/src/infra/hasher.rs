use anyhow::anyhow;
use argon2::password_hash::{self, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

use crate::domain::repository::CredentialHasher;
use crate::error::AccountsError;

/// Argon2id with default parameters. Digests are PHC strings carrying their
/// own salt and parameters.
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AccountsError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AccountsError::Internal(anyhow!("password hashing failed: {e}")))?;
        Ok(digest.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AccountsError> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| AccountsError::Internal(anyhow!("malformed password digest: {e}")))?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AccountsError::Internal(anyhow!(
                "password verification failed: {e}"
            ))),
        }
    }
}
