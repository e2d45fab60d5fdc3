//! Argon2id password hashing with an optional server-side pepper.
//!
//! Hashes are PHC strings. The pepper is fed to Argon2 as its secret input, so
//! it never appears in the stored string and must be the same for hash and verify.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use rand::rngs::OsRng;

use super::error::{IamError, IamResult};

fn hasher(pepper: Option<&[u8]>) -> IamResult<Argon2<'_>> {
    match pepper {
        Some(secret) if !secret.is_empty() => {
            Argon2::new_with_secret(secret, Algorithm::Argon2id, Version::V0x13, Params::default())
                .map_err(|_| IamError::internal("failed to initialize Argon2id"))
        }
        _ => Ok(Argon2::default()),
    }
}

/// Hash a password for storage in `password_hash`.
///
/// # Errors
/// Returns `Internal` if the hasher cannot be built or hashing fails.
pub fn hash_password(password: &str, pepper: Option<&[u8]>) -> IamResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(pepper)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| IamError::internal(format!("failed to hash password: {err}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string in constant time.
///
/// A mismatch is `Ok(false)`; only malformed hashes are errors.
///
/// # Errors
/// Returns `Internal` if the stored hash cannot be parsed.
pub fn verify_password(
    password: &str,
    stored_hash: &str,
    pepper: Option<&[u8]>,
) -> IamResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| IamError::internal(format!("invalid password hash: {err}")))?;
    match hasher(pepper)?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(IamError::internal(format!("password verify error: {err}"))),
    }
}

/// Spend the same Argon2 work as a real verification and discard the result.
///
/// Used when the username does not exist so response time does not reveal it.
pub fn burn_verification(password: &str, pepper: Option<&[u8]>) {
    let _ = hash_password(password, pepper);
}
