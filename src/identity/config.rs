//! Runtime settings for sessions, passwords and MFA.

use std::sync::Arc;

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MFA_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    session_cookie_secure: bool,
    password_pepper: Option<Arc<[u8]>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
            password_pepper: None,
        }
    }

    #[must_use]
    pub const fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_password_pepper(mut self, pepper: Option<Arc<[u8]>>) -> Self {
        self.password_pepper = pepper;
        self
    }

    #[must_use]
    pub const fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub const fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }

    #[must_use]
    pub fn password_pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }
}

#[derive(Clone, Debug)]
pub struct MfaConfig {
    challenge_ttl_seconds: i64,
    secret_key: Option<Arc<[u8]>>,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MfaConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            challenge_ttl_seconds: DEFAULT_MFA_CHALLENGE_TTL_SECONDS,
            secret_key: None,
        }
    }

    #[must_use]
    pub const fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    /// Key for sealing method secrets; must be 32 bytes to be usable.
    #[must_use]
    pub fn with_secret_key(mut self, key: Option<Arc<[u8]>>) -> Self {
        self.secret_key = key;
        self
    }

    #[must_use]
    pub const fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn secret_key(&self) -> Option<&[u8]> {
        self.secret_key.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let auth = AuthConfig::new();
        assert_eq!(auth.session_ttl_seconds(), 604_800);
        assert!(!auth.session_cookie_secure());
        assert!(auth.password_pepper().is_none());

        let mfa = MfaConfig::default();
        assert_eq!(mfa.challenge_ttl_seconds(), 300);
        assert!(mfa.secret_key().is_none());
    }

    #[test]
    fn builders_override() {
        let auth = AuthConfig::new()
            .with_session_ttl_seconds(60)
            .with_session_cookie_secure(true)
            .with_password_pepper(Some(Arc::from(b"pepper".as_slice())));
        assert_eq!(auth.session_ttl_seconds(), 60);
        assert!(auth.session_cookie_secure());
        assert_eq!(auth.password_pepper(), Some(b"pepper".as_slice()));

        let mfa = MfaConfig::new()
            .with_challenge_ttl_seconds(30)
            .with_secret_key(Some(Arc::from([1u8; 32].as_slice())));
        assert_eq!(mfa.challenge_ttl_seconds(), 30);
        assert_eq!(mfa.secret_key().map(<[u8]>::len), Some(32));
    }
}
