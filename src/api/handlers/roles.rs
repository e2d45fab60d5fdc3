use axum::{Json, extract::Extension, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{auth::principal::require_auth, error::ErrorResponse};
use crate::identity::{IamError, IamService, models::RoleSummary};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleItem {
    pub role_id: i64,
    pub role_name: String,
    pub role_description: Option<String>,
    /// Number of users currently holding the role.
    pub user_count: i64,
}

impl From<RoleSummary> for RoleItem {
    fn from(summary: RoleSummary) -> Self {
        Self {
            role_id: summary.role.role_id,
            role_name: summary.role.role_name,
            role_description: summary.role.role_description,
            user_count: summary.user_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleListResponse {
    pub roles: Vec<RoleItem>,
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles ordered by name", body = RoleListResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_roles(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
) -> Result<Json<RoleListResponse>, IamError> {
    require_auth(&headers, &service).await?;
    let roles = service.list_roles().await?;
    Ok(Json(RoleListResponse {
        roles: roles.into_iter().map(RoleItem::from).collect(),
    }))
}
