//! User directory endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session token.
//! 2) Clamp pagination (`page >= 1`, `1 <= per_page <= 100`).
//! 3) Read users with their role names from the store.

use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{PathRejection, QueryRejection},
    },
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::{auth::principal::require_auth, error::ErrorResponse};
use crate::{
    identity::{
        IamError, IamService,
        models::{AuthProvider, UserId, UserWithRoles},
    },
    store::Pagination,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersParams {
    /// 1-based page number, default 1.
    pub page: Option<i64>,
    /// Page size, default 50, at most 100.
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub auth_provider: AuthProvider,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub is_locked: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserWithRoles> for UserSummary {
    fn from(entry: UserWithRoles) -> Self {
        let UserWithRoles { user, roles } = entry;
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            auth_provider: user.auth_provider,
            roles,
            is_active: user.is_active,
            is_locked: user.is_locked,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserDetail {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserDetailResponse {
    pub user: UserDetail,
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(ListUsersParams),
    responses(
        (status = 200, description = "One page of users with their roles", body = UserListResponse),
        (status = 400, description = "Malformed query", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    params: Result<Query<ListUsersParams>, QueryRejection>,
) -> Result<Json<UserListResponse>, IamError> {
    require_auth(&headers, &service).await?;
    let Query(params) = params.map_err(|_| IamError::validation("Invalid query parameters"))?;

    let page = service
        .list_users(Pagination::clamped(params.page, params.per_page))
        .await?;
    Ok(Json(UserListResponse {
        users: page.items.into_iter().map(UserSummary::from).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        pages: page.pages,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail", body = UserDetailResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<UserDetailResponse>, IamError> {
    require_auth(&headers, &service).await?;
    let Path(user_id) = id.map_err(|_| IamError::validation("Invalid user id"))?;

    let entry = service.user_detail(user_id).await?;
    let phone_number = entry.user.phone_number.clone();
    Ok(Json(UserDetailResponse {
        user: UserDetail {
            summary: UserSummary::from(entry),
            phone_number,
        },
    }))
}
