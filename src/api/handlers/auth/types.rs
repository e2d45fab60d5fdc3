use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::Identity;

/// Missing fields deserialize as empty strings and are rejected as validation errors.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub status: String,
    /// Same value as the `iam_session` cookie, for bearer clients.
    pub session_token: String,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub authenticated: bool,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub status: String,
    pub message: String,
}
