//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{
    principal::require_auth,
    types::{LogoutResponse, VerifyResponse},
};
use crate::{
    api::handlers::error::ErrorResponse,
    identity::{AuthConfig, ClientInfo, IamError, IamService},
};

pub(crate) const SESSION_COOKIE_NAME: &str = "iam_session";

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Session is valid", body = VerifyResponse),
        (status = 401, description = "Missing, ended or expired session", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
) -> Result<Json<VerifyResponse>, IamError> {
    let principal = require_auth(&headers, &service).await?;
    Ok(Json(VerifyResponse {
        authenticated: true,
        user: principal.identity,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session ended and cookie cleared", body = LogoutResponse),
        (status = 401, description = "Missing or already ended session", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    client: ClientInfo,
) -> Result<impl IntoResponse, IamError> {
    let token = extract_session_token(&headers).ok_or(IamError::Unauthenticated)?;
    // Ends the session whatever the account status.
    if !service.logout(&token, &client).await? {
        return Err(IamError::Unauthenticated);
    }

    let mut response_headers = HeaderMap::new();
    match clear_session_cookie(service.auth_config()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clear-cookie header: {err}"),
    }
    Ok((
        StatusCode::OK,
        response_headers,
        Json(LogoutResponse {
            status: "success".to_string(),
            message: "Logged out".to_string(),
        }),
    ))
}

/// Build the `HttpOnly` session cookie.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer header first, then the `iam_session` cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            let val = val.trim();
            if key.trim() == SESSION_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(COOKIE, HeaderValue::from_static("iam_session=def"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; iam_session=tok-123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok-123"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        headers.insert(COOKIE, HeaderValue::from_static("iam_session="));
        assert_eq!(extract_session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn cookie_attributes() {
        let config = AuthConfig::new().with_session_ttl_seconds(60);
        let cookie = session_cookie(&config, "tok").map(|value| value.to_str().map(str::to_string));
        let expected = "iam_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60";
        assert!(matches!(cookie, Ok(Ok(ref value)) if value == expected));

        let secure = AuthConfig::new().with_session_cookie_secure(true);
        let cleared = clear_session_cookie(&secure).map(|value| value.to_str().map(str::to_string));
        assert!(matches!(
            cleared,
            Ok(Ok(ref value)) if value.ends_with("Max-Age=0; Secure")
        ));
    }
}
