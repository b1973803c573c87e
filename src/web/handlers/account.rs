use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::identity::IdentityError;
use crate::utils::http::HttpResponse;
use crate::AppContext;

use super::{reject, session_owner};

pub fn account_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/token", post(login))
        .route("/users/me", delete(delete_me))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub async fn signup(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    match ctx.identity.signup(&req.email, &req.password).await {
        Ok(_) => {
            let response =
                HttpResponse::new(0, "User created successfully".to_string(), String::new());
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(IdentityError::EmailTaken) => reject(
            StatusCode::CONFLICT,
            "An account with this email already exists.",
        )
        .into_response(),
        Err(IdentityError::InvalidCredentials) => reject(
            StatusCode::BAD_REQUEST,
            "Email and password must not be empty.",
        )
        .into_response(),
        Err(e) => {
            error!("signup failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<TokenRequest>,
) -> impl IntoResponse {
    match ctx.identity.login(&req.email, &req.password).await {
        Ok(token) => {
            let response = HttpResponse::new(
                0,
                "OK".to_string(),
                TokenResponse {
                    access_token: token,
                    token_type: "bearer".to_string(),
                },
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(IdentityError::InvalidCredentials) => {
            reject(StatusCode::UNAUTHORIZED, "Incorrect email or password").into_response()
        }
        Err(e) => {
            error!("login failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

pub async fn delete_me(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let owner = match session_owner(&ctx, &headers).await {
        Ok(owner) => owner,
        Err(rejection) => return rejection.into_response(),
    };

    match ctx.identity.delete_owner(&owner).await {
        Ok(()) => {
            let response = HttpResponse::new(
                0,
                "Your account and all associated data have been successfully deleted.".to_string(),
                String::new(),
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("account deletion failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
