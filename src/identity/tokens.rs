//! Session token generation and hashing.
//!
//! The raw token only travels to the client (cookie or JSON body); the store
//! keys sessions by the hex SHA-256 of it.

use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use super::error::{IamError, IamResult};

/// Create a new random session token (32 bytes, URL-safe base64).
///
/// # Errors
/// Returns `Internal` if the OS RNG fails.
pub fn generate_session_token() -> IamResult<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| IamError::internal(format!("failed to generate session token: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Derive the stored `session_id` for a token: 64 lowercase hex chars.
#[must_use]
pub fn session_id_for(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
