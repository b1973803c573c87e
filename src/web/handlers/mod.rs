use axum::http::{HeaderMap, StatusCode};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::warn;

use crate::identity::{IdentityError, Owner};
use crate::utils::http::HttpResponse;
use crate::AppContext;

pub mod account;
pub mod projects;
pub mod usage;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .merge(usage::usage_router(ctx.clone()))
        .merge(account::account_router(ctx.clone()))
        .merge(projects::project_router(ctx))
}

type Rejection = (StatusCode, Json<HttpResponse<String>>);

pub(crate) fn reject(status: StatusCode, message: &str) -> Rejection {
    (
        status,
        Json(HttpResponse::new(
            status.as_u16(),
            message.to_string(),
            String::new(),
        )),
    )
}

/// Resolves the session bearer token for user-facing endpoints. Usage
/// reporting authenticates with a sentinel key instead (`usage` handlers).
pub(crate) async fn session_owner(
    ctx: &AppContext,
    headers: &HeaderMap,
) -> Result<Owner, Rejection> {
    let bearer = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok());

    match ctx.identity.authorize(bearer).await {
        Ok(owner) => Ok(owner),
        Err(IdentityError::Storage(e)) => {
            warn!("session check failed: {}", e);
            Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ))
        }
        Err(e) => {
            warn!("session rejected: {}", e);
            Err(reject(
                StatusCode::UNAUTHORIZED,
                "Could not validate credentials",
            ))
        }
    }
}
