use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::identity::IdentityError;
use crate::usage::UsageError;
use crate::utils::http::HttpResponse;
use crate::AppContext;

use super::{reject, session_owner};

pub fn project_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:project_id", delete(delete_project))
        .route("/v1/projects/:project_id/stats", get(project_stats))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub sentinel_key: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProjectStatsResponse {
    pub project_id: i64,
    pub project_name: String,
    pub year: i32,
    pub month: u32,
    pub monthly_budget: Option<i64>,
    pub total_usage: Decimal,
    pub total_cost: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

fn identity_failure(e: IdentityError) -> axum::response::Response {
    match e {
        IdentityError::NotFound => {
            reject(StatusCode::NOT_FOUND, "Project not found.").into_response()
        }
        IdentityError::Storage(err) => {
            error!("identity store error: {}", err);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
        _ => reject(StatusCode::UNAUTHORIZED, "Could not validate credentials").into_response(),
    }
}

pub async fn create_project(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let owner = match session_owner(&ctx, &headers).await {
        Ok(owner) => owner,
        Err(rejection) => return rejection.into_response(),
    };

    let project = match ctx.identity.create_project(&owner, &req.name).await {
        Ok(project) => project,
        Err(e) => return identity_failure(e),
    };

    // every project starts with one active sentinel key, like the dashboard
    // expects
    let key = match ctx.gate.issue_key(project.id).await {
        Ok(key) => key,
        Err(e) => {
            error!("failed to issue sentinel key: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
    };

    let response = HttpResponse::new(
        0,
        "Project created".to_string(),
        ProjectResponse {
            id: project.id,
            name: project.name,
            owner_id: project.owner_id,
            sentinel_key: key.secret,
        },
    );
    (StatusCode::CREATED, Json(response)).into_response()
}

pub async fn list_projects(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let owner = match session_owner(&ctx, &headers).await {
        Ok(owner) => owner,
        Err(rejection) => return rejection.into_response(),
    };

    let projects = match ctx.identity.list_projects(&owner).await {
        Ok(projects) => projects,
        Err(e) => return identity_failure(e),
    };

    let mut body = Vec::with_capacity(projects.len());
    for project in projects {
        let sentinel_key = match ctx.gate.active_key(project.id).await {
            Ok(Some(key)) => key.secret,
            Ok(None) => "N/A".to_string(),
            Err(e) => {
                error!("failed to load project keys: {}", e);
                return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .into_response();
            }
        };
        body.push(ProjectResponse {
            id: project.id,
            name: project.name,
            owner_id: project.owner_id,
            sentinel_key,
        });
    }

    let response = HttpResponse::new(0, "OK".to_string(), body);
    (StatusCode::OK, Json(response)).into_response()
}

pub async fn delete_project(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
) -> impl IntoResponse {
    let owner = match session_owner(&ctx, &headers).await {
        Ok(owner) => owner,
        Err(rejection) => return rejection.into_response(),
    };

    match ctx.identity.delete_project(&owner, project_id).await {
        Ok(project) => {
            let response = HttpResponse::new(
                0,
                format!(
                    "Project '{}' and all its data have been successfully deleted.",
                    project.name
                ),
                String::new(),
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => identity_failure(e),
    }
}

pub async fn project_stats(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let owner = match session_owner(&ctx, &headers).await {
        Ok(owner) => owner,
        Err(rejection) => return rejection.into_response(),
    };

    // ownership check first, so foreign and missing projects answer alike
    let project = match ctx.identity.project_for_owner(&owner, project_id).await {
        Ok(project) => project,
        Err(e) => return identity_failure(e),
    };

    let now = Utc::now();
    let year = query.year.unwrap_or_else(|| now.year());
    let month = query.month.unwrap_or_else(|| now.month());

    let stats = match ctx.aggregator.monthly_stats(project.id, year, month).await {
        Ok(stats) => stats,
        Err(UsageError::Validation(reason)) => {
            return reject(StatusCode::BAD_REQUEST, &reason).into_response();
        }
        Err(UsageError::Storage(e)) => {
            error!("failed to compute project stats: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
    };

    let monthly_budget = match ctx.gate.active_key(project.id).await {
        Ok(key) => key.map(|key| key.monthly_budget),
        Err(e) => {
            error!("failed to load project keys: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                .into_response();
        }
    };

    let response = HttpResponse::new(
        0,
        "OK".to_string(),
        ProjectStatsResponse {
            project_id: project.id,
            project_name: project.name,
            year,
            month,
            monthly_budget,
            total_usage: stats.total_usage,
            total_cost: stats.total_cost,
            period_start: stats.period_start,
            period_end: stats.period_end,
        },
    );
    (StatusCode::OK, Json(response)).into_response()
}
