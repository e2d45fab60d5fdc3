//! One-time codes for MFA challenges and at-rest encryption of method secrets.
//!
//! Codes are six decimal digits from the OS RNG, stored only as Argon2id PHC
//! strings. Method secrets (TOTP seeds, app keys) are sealed with
//! ChaCha20-Poly1305 under the configured 32-byte key; the layout is
//! `nonce (12 bytes) || ciphertext` and the owning user id is bound as AAD so
//! a ciphertext copied onto another user's row fails to open.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{Rng, RngCore, rngs::OsRng};

use super::error::{IamError, IamResult};
use super::models::{MfaMethodType, UserId};

pub const OTP_CODE_LEN: usize = 6;
pub const MFA_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Generate a fresh six-digit code, zero padded.
#[must_use]
pub fn generate_otp_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{value:06}")
}

/// Strip whitespace and accept only exactly six ASCII digits.
#[must_use]
pub fn normalize_otp_code(input: &str) -> Option<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() == OTP_CODE_LEN && compact.bytes().all(|b| b.is_ascii_digit()) {
        Some(compact)
    } else {
        None
    }
}

/// # Errors
/// Returns `Internal` if Argon2 hashing fails.
pub fn hash_otp_code(code: &str) -> IamResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map_err(|err| IamError::internal(format!("failed to hash otp code: {err}")))?;
    Ok(hash.to_string())
}

/// Check a supplied code against the stored hash. Malformed input never matches.
#[must_use]
pub fn verify_otp_code(supplied: &str, stored_hash: &str) -> bool {
    let Some(code) = normalize_otp_code(supplied) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(code.as_bytes(), &parsed)
        .is_ok()
}

fn secret_aad(user_id: UserId, method_type: MfaMethodType) -> Vec<u8> {
    format!("mfa-secret:v1|{user_id}|{}", method_type.as_str()).into_bytes()
}

/// Seal a method secret for `secret_ciphertext`.
///
/// # Errors
/// Returns `Internal` if the key has the wrong length or encryption fails.
#[allow(deprecated)]
pub fn encrypt_secret(
    key: &[u8],
    user_id: UserId,
    method_type: MfaMethodType,
    secret: &[u8],
) -> IamResult<Vec<u8>> {
    if key.len() != MFA_KEY_LEN {
        return Err(IamError::internal("invalid MFA secret key length"));
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let aad = secret_aad(user_id, method_type);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: secret,
                aad: &aad,
            },
        )
        .map_err(|err| IamError::internal(format!("encryption failure: {err}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed method secret.
///
/// # Errors
/// Returns `Internal` on a short buffer, a wrong key, a foreign row or tampering.
#[allow(deprecated)]
pub fn decrypt_secret(
    key: &[u8],
    user_id: UserId,
    method_type: MfaMethodType,
    sealed: &[u8],
) -> IamResult<Vec<u8>> {
    if key.len() != MFA_KEY_LEN {
        return Err(IamError::internal("invalid MFA secret key length"));
    }
    if sealed.len() < NONCE_LEN {
        return Err(IamError::internal("invalid ciphertext length"));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let aad = secret_aad(user_id, method_type);

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|err| IamError::internal(format!("decryption failure: {err}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn otp_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_otp_code();
            assert_eq!(code.len(), OTP_CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn normalize_rejects_non_digits_and_wrong_length() {
        assert_eq!(normalize_otp_code(" 012 345 "), Some("012345".to_string()));
        assert_eq!(normalize_otp_code("12345"), None);
        assert_eq!(normalize_otp_code("1234567"), None);
        assert_eq!(normalize_otp_code("12a456"), None);
    }

    #[test]
    fn otp_hash_verifies_only_the_issued_code() {
        let hash = hash_otp_code("042424").unwrap();
        assert!(!hash.contains("042424"));
        assert!(verify_otp_code("042424", &hash));
        assert!(verify_otp_code("042 424", &hash));
        assert!(!verify_otp_code("042425", &hash));
        assert!(!verify_otp_code("042424", "garbage"));
    }

    #[test]
    fn secret_round_trip() {
        let sealed = encrypt_secret(&KEY, 9, MfaMethodType::Totp, b"JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(sealed.as_slice(), b"JBSWY3DPEHPK3PXP".as_slice());
        let opened = decrypt_secret(&KEY, 9, MfaMethodType::Totp, &sealed).unwrap();
        assert_eq!(opened, b"JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn secret_bound_to_user() {
        let sealed = encrypt_secret(&KEY, 9, MfaMethodType::Totp, b"seed").unwrap();
        assert!(decrypt_secret(&KEY, 10, MfaMethodType::Totp, &sealed).is_err());
        assert!(decrypt_secret(&[8u8; 32], 9, MfaMethodType::Totp, &sealed).is_err());
    }

    #[test]
    fn tampered_or_short_ciphertext_fails() {
        let mut sealed = encrypt_secret(&KEY, 1, MfaMethodType::CustomApp, b"seed").unwrap();
        let len = sealed.len();
        if let Some(byte) = sealed.get_mut(len - 1) {
            *byte ^= 0xFF;
        }
        assert!(decrypt_secret(&KEY, 1, MfaMethodType::CustomApp, &sealed).is_err());
        assert!(decrypt_secret(&KEY, 1, MfaMethodType::CustomApp, &[0u8; 4]).is_err());
    }

    #[test]
    fn wrong_key_length_rejected() {
        assert!(encrypt_secret(&[1u8; 16], 1, MfaMethodType::Totp, b"seed").is_err());
    }
}
