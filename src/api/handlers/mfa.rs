//! One-time code challenges for the signed-in user.
//!
//! Flow Overview:
//! 1) `POST /api/mfa/challenges` issues a code and hands it to the delivery
//!    channel. The response carries only the challenge id and expiry.
//! 2) `POST /api/mfa/challenges/{id}/verify` redeems it. A challenge is
//!    single-use; expired, consumed, foreign or wrong-code attempts all get the
//!    same 400.

use axum::{
    Json,
    extract::{
        Extension, Path,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::{auth::principal::require_auth, error::ErrorResponse};
use crate::{
    api::delivery::{CodeDelivery, CodeSender},
    identity::{
        ClientInfo, IamError, IamService,
        models::{ChallengePurpose, MfaMethodType},
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub method_type: MfaMethodType,
    #[serde(default)]
    pub purpose: ChallengePurpose,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    pub challenge_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyCodeResponse {
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/mfa/challenges",
    request_body = ChallengeRequest,
    responses(
        (status = 201, description = "Challenge issued; code sent", body = ChallengeResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "mfa"
)]
pub async fn issue_challenge(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    Extension(sender): Extension<Arc<dyn CodeSender>>,
    client: ClientInfo,
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, IamError> {
    let principal = require_auth(&headers, &service).await?;
    let Json(request) = payload.map_err(|_| IamError::validation("Invalid request"))?;

    let issued = service
        .issue_challenge(
            principal.user_id,
            request.method_type,
            request.purpose,
            &client,
        )
        .await?;

    let delivery = CodeDelivery {
        user_id: principal.user_id,
        email: principal.identity.email,
        method_type: request.method_type,
        challenge_id: issued.challenge_id,
        code: issued.code,
    };
    sender.send(&delivery).map_err(|err| {
        error!(challenge_id = issued.challenge_id, "Failed to deliver MFA code: {err}");
        IamError::internal(err)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ChallengeResponse {
            challenge_id: issued.challenge_id,
            expires_at: issued.expires_at,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/mfa/challenges/{id}/verify",
    params(
        ("id" = i64, Path, description = "Challenge id")
    ),
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code accepted", body = VerifyCodeResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse)
    ),
    tag = "mfa"
)]
pub async fn verify_challenge(
    headers: HeaderMap,
    Extension(service): Extension<Arc<IamService>>,
    client: ClientInfo,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> Result<Json<VerifyCodeResponse>, IamError> {
    let principal = require_auth(&headers, &service).await?;
    let Path(challenge_id) = id.map_err(|_| IamError::validation("Invalid challenge id"))?;
    let Json(request) = payload.map_err(|_| IamError::validation("Invalid request"))?;

    let accepted = service
        .consume_owned_challenge(principal.user_id, challenge_id, &request.code, &client)
        .await?;
    if !accepted {
        return Err(IamError::validation("Invalid or expired code"));
    }
    Ok(Json(VerifyCodeResponse {
        status: "success".to_string(),
    }))
}
