//! HTTP mapping for [`IamError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::identity::IamError;

/// Body of every error response: `{"status":"error","message":...}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

impl IamError {
    /// Status code and client-facing message. Store and internal detail stay out.
    #[must_use]
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials".into()),
            Self::AccountDisabled => (StatusCode::FORBIDDEN, "Account disabled or locked".into()),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authentication required".into()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable".into(),
            ),
            Self::Conflict(what) => (StatusCode::CONFLICT, format!("{what} already exists")),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for IamError {
    fn into_response(self) -> Response {
        match &self {
            Self::StoreUnavailable(detail) => error!("Store unavailable: {detail}"),
            Self::Internal(detail) => error!("Internal error: {detail}"),
            _ => {}
        }
        let (status, message) = self.status_and_message();
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
