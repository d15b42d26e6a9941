//! Salted password hashing for email/password login.
//!
//! Hashes are PBKDF2-HMAC-SHA256 in PHC string form
//! (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`), so the round count
//! travels with each stored hash.

use crate::constants::PASSWORD_HASH_ROUNDS;
use crate::error::{ApiError, ApiResult};
use pbkdf2::password_hash::{
    PasswordHash as PhcHash, PasswordHasher, PasswordVerifier, SaltString,
};
use pbkdf2::{Params, Pbkdf2};

const SALT_LEN: usize = 16;
const OUTPUT_LEN: usize = 32;

/// Stored password digest.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

impl PasswordHash {
    /// Hash `password` with a fresh random salt.
    pub fn create(password: &str) -> ApiResult<Self> {
        Self::create_with_rounds(password, PASSWORD_HASH_ROUNDS)
    }

    pub(crate) fn create_with_rounds(password: &str, rounds: u32) -> ApiResult<Self> {
        if password.len() < 6 {
            return Err(ApiError::validation_failed(
                "Password must be at least 6 characters long",
            ));
        }
        let salt_bytes: [u8; SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode salt: {}", e)))?;
        let params = Params {
            rounds,
            output_length: OUTPUT_LEN,
        };
        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))?;
        Ok(Self(hash.to_string()))
    }

    /// Constant-time comparison of `password` against the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        match PhcHash::new(&self.0) {
            Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
