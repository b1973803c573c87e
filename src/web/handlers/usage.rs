use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::usage::UsageError;
use crate::utils::http::HttpResponse;
use crate::AppContext;

pub const SENTINEL_KEY_HEADER: &str = "X-Sentinel-Key";

pub fn usage_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/v1/usage", post(report_usage))
        .route("/keys/verify", get(verify_key))
        .with_state(ctx)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UsageReportRequest {
    pub metric: f64,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct UsageReportResponse {
    pub event_id: i64,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct KeyDetailsResponse {
    pub project_id: i64,
    pub monthly_budget: i64,
    pub total_usage: Decimal,
    pub total_cost: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

// Unknown and revoked keys answer identically; the log keeps them apart.
fn auth_failure(e: AuthError) -> axum::response::Response {
    warn!("usage call rejected: {}", e);
    let (status, message) = match e {
        AuthError::MissingKey => (StatusCode::UNAUTHORIZED, "Missing sentinel key"),
        AuthError::InvalidKey | AuthError::Revoked => {
            (StatusCode::UNAUTHORIZED, "Invalid sentinel key")
        }
        AuthError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };
    (
        status,
        Json(HttpResponse::new(
            status.as_u16(),
            message.to_string(),
            String::new(),
        )),
    )
        .into_response()
}

fn sentinel_key<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    headers
        .get(SENTINEL_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}

pub async fn report_usage(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(req): Json<UsageReportRequest>,
) -> impl IntoResponse {
    let principal = match ctx.gate.authenticate(sentinel_key(&headers)).await {
        Ok(principal) => principal,
        Err(e) => return auth_failure(e),
    };

    match ctx
        .recorder
        .record(&principal.project, principal.key.id, req.metric, req.metadata)
        .await
    {
        Ok(event) => {
            let response = HttpResponse::new(
                0,
                "Usage recorded".to_string(),
                UsageReportResponse {
                    event_id: event.id,
                    quantity: event.quantity,
                    cost: event.cost,
                    timestamp: event.timestamp,
                },
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(UsageError::Validation(reason)) => {
            let response = HttpResponse::new(400, reason, String::new());
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        Err(UsageError::Storage(e)) => {
            error!("failed to persist usage event: {}", e);
            let response = HttpResponse::new(
                503,
                "Usage store unavailable, retry later".to_string(),
                String::new(),
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
        }
    }
}

/// Key check for SDK callers: resolves the key and reports the current
/// month's consumption against the key's informational budget.
pub async fn verify_key(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let principal = match ctx.gate.authenticate(sentinel_key(&headers)).await {
        Ok(principal) => principal,
        Err(e) => return auth_failure(e),
    };

    let now = Utc::now();
    match ctx
        .aggregator
        .monthly_stats(principal.project.id, now.year(), now.month())
        .await
    {
        Ok(stats) => {
            let response = HttpResponse::new(
                0,
                "OK".to_string(),
                KeyDetailsResponse {
                    project_id: principal.project.id,
                    monthly_budget: principal.key.monthly_budget,
                    total_usage: stats.total_usage,
                    total_cost: stats.total_cost,
                    period_start: stats.period_start,
                    period_end: stats.period_end,
                },
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("failed to compute key usage: {}", e);
            let response = HttpResponse::new(
                500,
                "Internal server error".to_string(),
                String::new(),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
