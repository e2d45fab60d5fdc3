//! Password login.
//!
//! The service does the credential work; this handler only shapes the
//! response and sets the session cookie. The token also goes into the body so
//! non-browser clients can send it back as `Authorization: Bearer`.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{
    session::session_cookie,
    types::{LoginRequest, LoginResponse},
};
use crate::{
    api::handlers::error::ErrorResponse,
    identity::{ClientInfo, IamError, IamService},
};

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded; session cookie set", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled or locked", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(service): Extension<Arc<IamService>>,
    client: ClientInfo,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IamError> {
    let Json(request) = payload.map_err(|_| IamError::validation("Invalid request"))?;
    let outcome = service
        .authenticate(&request.username, &request.password, &client)
        .await?;

    let mut headers = HeaderMap::new();
    let cookie = session_cookie(service.auth_config(), &outcome.session_token).map_err(|err| {
        error!("Failed to build session cookie: {err}");
        IamError::internal(err)
    })?;
    headers.insert(SET_COOKIE, cookie);

    Ok((
        StatusCode::OK,
        headers,
        Json(LoginResponse {
            status: "success".to_string(),
            session_token: outcome.session_token,
            user: outcome.identity,
        }),
    ))
}
