use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{RegisterRequest, RegisterResponse},
        error::RegisterError,
        jwt::AuthUser,
        repo_types::User,
        services,
    },
    state::AppState,
};

pub const REGISTERED_MESSAGE: &str = "User registered successfully";

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/register", post(register))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), RegisterError> {
    let Json(body) = body?;
    let payload = RegisterRequest::from_json(&body).map_err(RegisterError::Validation)?;
    let out = services::register(&state.users, state.tokens.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: REGISTERED_MESSAGE.into(),
            user: out.user,
            token: out.token,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<User>, (StatusCode, String)> {
    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => {
            error!(error = %e, user_id, "load user failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into()))
        }
    }
}
