//! Auth handlers and supporting modules.
//!
//! ## Sessions
//!
//! Login sets `iam_session` (`HttpOnly`, `SameSite=Lax`, `Secure` when
//! configured) and returns the same token in the body. Every protected route
//! resolves the token through [`principal::require_auth`]; nothing about the
//! session is cached between requests.

pub(crate) mod login;
pub(crate) mod principal;
pub(crate) mod session;
pub(crate) mod types;
