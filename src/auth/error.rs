use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::{
    repo::{StoreError, UniqueField},
    validation::FieldError,
};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Body(#[from] JsonRejection),
    #[error("{0} already taken")]
    Conflict(UniqueField),
    #[error("token issuance failed: {0}")]
    TokenIssuance(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for RegisterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(field) => RegisterError::Conflict(field),
            other => RegisterError::Internal(other.into()),
        }
    }
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        match self {
            RegisterError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            RegisterError::Body(rejection) => (
                rejection.status(),
                Json(json!({ "errors": [{ "message": rejection.body_text() }] })),
            )
                .into_response(),
            RegisterError::Conflict(field) => {
                let errors = [FieldError::new(
                    field.as_str(),
                    "unique",
                    format!("{field} already taken"),
                )];
                (StatusCode::CONFLICT, Json(json!({ "errors": errors }))).into_response()
            }
            RegisterError::TokenIssuance(e) | RegisterError::Internal(e) => {
                error!(error = %e, "registration failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "errors": [{ "message": "internal server error" }] })),
                )
                    .into_response()
            }
        }
    }
}
