use axum::{Json, extract::Extension, http::HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{auth::principal::require_auth, error::ErrorResponse};
use crate::identity::{
    IamError, IamService,
    models::{ActiveSession, UserId},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionItem {
    /// SHA-256 of the session token, never the token itself.
    pub session_id: String,
    pub user_id: UserId,
    pub username: String,
    pub login_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<ActiveSession> for SessionItem {
    fn from(session: ActiveSession) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id,
            username: session.username,
            login_time: session.login_time,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActiveSessionsResponse {
    pub sessions: Vec<SessionItem>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/api/sessions/active",
    responses(
        (status = 200, description = "Open sessions, newest first", body = ActiveSessionsResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "audit"
)]
pub async fn active_sessions(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
) -> Result<Json<ActiveSessionsResponse>, IamError> {
    require_auth(&headers, &service).await?;
    let sessions: Vec<SessionItem> = service
        .active_sessions()
        .await?
        .into_iter()
        .map(SessionItem::from)
        .collect();
    Ok(Json(ActiveSessionsResponse {
        total: sessions.len(),
        sessions,
    }))
}
