//! Read access to the authentication audit trail.

use axum::{
    Json,
    extract::{Extension, Query, rejection::QueryRejection},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::{auth::principal::require_auth, error::ErrorResponse};
use crate::identity::{
    IamError, IamService,
    models::{AuthEventType, AuthLog, UserId},
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditParams {
    /// Maximum rows, default 100, at most 500.
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogItem {
    pub log_id: i64,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub event_type: AuthEventType,
    pub event_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
}

impl From<AuthLog> for AuditLogItem {
    fn from(log: AuthLog) -> Self {
        Self {
            log_id: log.log_id,
            user_id: log.user_id,
            username: log.username,
            event_type: log.event_type,
            event_time: log.event_time,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            details: log.details,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditLogResponse {
    pub logs: Vec<AuditLogItem>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/api/audit/logs",
    params(AuditParams),
    responses(
        (status = 200, description = "Most recent events first", body = AuditLogResponse),
        (status = 400, description = "Malformed query", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "audit"
)]
pub async fn recent_logs(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    params: Result<Query<AuditParams>, QueryRejection>,
) -> Result<Json<AuditLogResponse>, IamError> {
    require_auth(&headers, &service).await?;
    let Query(params) = params.map_err(|_| IamError::validation("Invalid query parameters"))?;

    let logs: Vec<AuditLogItem> = service
        .recent_auth_logs(params.limit)
        .await?
        .into_iter()
        .map(AuditLogItem::from)
        .collect();
    Ok(Json(AuditLogResponse {
        total: logs.len(),
        logs,
    }))
}
