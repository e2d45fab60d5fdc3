//! Authenticated principal extraction.
//!
//! Flow Overview: read the session token (bearer header first, then the
//! cookie), resolve it through `IamService::verify`, and hand handlers a
//! principal carrying the fresh identity.

use axum::http::HeaderMap;

use super::session::extract_session_token;
use crate::identity::{IamError, IamService, Identity, models::UserId};

/// Authenticated user context for one request.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: UserId,
    pub identity: Identity,
}

/// Resolve the request credential into a principal, or `Unauthenticated`.
///
/// Store outages surface as `StoreUnavailable`, not as 401.
pub async fn require_auth(
    headers: &HeaderMap,
    service: &IamService,
) -> Result<Principal, IamError> {
    let token = extract_session_token(headers).ok_or(IamError::Unauthenticated)?;
    let identity = service.verify(&token).await?;
    Ok(Principal {
        user_id: identity.user_id,
        identity,
    })
}
