use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::error;

use crate::config::HasherConfig;

const SALT_LEN: usize = 16;

// Only used to equalize the not-found path; never matches a real user.
const DUMMY_PASSWORD: &str = "monolith-dummy-password";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("random source failed: {0}")]
    Rng(#[from] rand::Error),
    #[error("argon2 hashing failed: {0}")]
    Hash(password_hash::Error),
    #[error("malformed encoded hash: {0}")]
    Malformed(password_hash::Error),
}

/// argon2id hasher producing self-describing PHC strings
/// (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<digest>`).
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Argon2Hasher {
    pub fn new(config: &HasherConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(config.output_len),
        )
        .map_err(HashError::Params)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hasher = Self {
            argon2,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    pub fn hash(&self, plain: &str) -> Result<String, HashError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt)?;
        let salt = SaltString::encode_b64(&salt).map_err(HashError::Hash)?;
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                HashError::Hash(e)
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` only for a well-formed hash that doesn't match; anything
    /// wrong with the hash itself is `HashError::Malformed`.
    pub fn verify(&self, plain: &str, encoded: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(encoded).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            HashError::Malformed(e)
        })?;
        if parsed.salt.is_none() || parsed.hash.is_none() {
            return Err(HashError::Malformed(password_hash::Error::PhcStringField));
        }
        match self.argon2.verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Malformed(e)),
        }
    }

    /// Full verification against a hash with this hasher's cost, for callers
    /// that must spend the same time whether or not a user exists.
    pub fn verify_dummy(&self, plain: &str) -> bool {
        matches!(self.verify(plain, &self.dummy_hash), Ok(true))
    }
}
