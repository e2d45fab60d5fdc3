use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{GIT_COMMIT_HASH, identity::IamService};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    status: String,
    service: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Store is reachable", body = Health),
        (status = 503, description = "Store is unreachable", body = Health)
    ),
    tag = "health"
)]
pub async fn health(Extension(service): Extension<Arc<IamService>>) -> impl IntoResponse {
    let result = service.ping().await;

    let health = Health {
        status: "ok".to_string(),
        service: "IAM".to_string(),
        database: match &result {
            Ok(()) => "connected".to_string(),
            Err(err) => {
                error!("Failed to ping store: {err}");
                "error: unavailable".to_string()
            }
        },
    };

    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        ""
    };

    let headers = format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
    .parse::<HeaderValue>()
    .map(|x_app_header_value| {
        debug!("X-App header: {:?}", x_app_header_value);

        let mut headers = HeaderMap::new();
        headers.insert("X-App", x_app_header_value);
        headers
    })
    .unwrap_or_else(|err| {
        error!("Failed to parse X-App header: {}", err);
        HeaderMap::new()
    });

    let status = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, Json(health))
}
