//! Identity domain: records, credentials, MFA primitives and the service that
//! ties them to a store.

pub mod config;
pub mod error;
pub mod mfa;
pub mod models;
pub mod password;
pub mod service;
pub mod tokens;

pub use self::config::{AuthConfig, MfaConfig};
pub use self::error::{IamError, IamResult};
pub use self::models::{ClientInfo, Identity};
pub use self::service::{AuthOutcome, IamService, IssuedChallenge, NewAccount};
