use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Bitcoin base58 alphabet: no `0`, `O`, `I` or `l`.
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of every user id. 58^22 > 2^128.
pub const USER_ID_LEN: usize = 22;

// Largest multiple of 58 that fits in a byte; bytes at or above it are
// discarded so that `byte % 58` stays uniform.
const REJECT_FROM: u8 = 58 * 4;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("random source failed: {0}")]
    Rng(#[from] rand::Error),
}

/// Random base58 string of exactly `len` characters drawn from the OS CSPRNG.
pub fn random_id(len: usize) -> Result<String, IdError> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        OsRng.try_fill_bytes(&mut buf)?;
        for &b in buf.iter().filter(|&&b| b < REJECT_FROM) {
            out.push(ALPHABET[(b % 58) as usize] as char);
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}

pub fn new_user_id() -> Result<String, IdError> {
    random_id(USER_ID_LEN)
}
