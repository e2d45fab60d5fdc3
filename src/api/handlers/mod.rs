//! API handlers for the IAM service.
//!
//! Every handler takes the shared [`crate::identity::IamService`] from an
//! `Extension`, resolves the caller with `auth::principal::require_auth` when
//! the route is protected, and returns `Result<_, IamError>` so failures map
//! through one status table (see [`error`]).

pub mod audit;
pub mod auth;
pub mod client;
pub mod error;
pub mod health;
pub mod mfa;
pub mod roles;
pub mod sessions;
pub mod users;
