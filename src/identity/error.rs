use thiserror::Error;

pub type IamResult<T> = Result<T, IamError>;

/// Failure taxonomy shared by the service, the stores and the HTTP layer.
///
/// `StoreUnavailable` and `Internal` carry a detail string for logs only; the
/// HTTP mapping never echoes it.
#[derive(Debug, Error)]
pub enum IamError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account disabled or locked")]
    AccountDisabled,
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IamError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }

    /// True when the failure came from the backing store being unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_subject() {
        assert_eq!(IamError::not_found("User").to_string(), "User not found");
        assert_eq!(
            IamError::conflict("Role").to_string(),
            "Role already exists"
        );
        assert_eq!(
            IamError::validation("Username and password required").to_string(),
            "Username and password required"
        );
    }

    #[test]
    fn unavailable_is_detected() {
        assert!(IamError::StoreUnavailable("pool timed out".into()).is_unavailable());
        assert!(!IamError::Unauthenticated.is_unavailable());
    }
}
