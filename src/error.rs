//! Error type returned by every route handler.
//!
//! Validation failures answer 400 with a field-level `errors` array, every
//! other failure answers `{ "success": false, "message": ... }`. Internal
//! details are logged and replaced by a static message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::routes::auth::AuthError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            Self::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response(),
            Self::Repository(RepositoryError::InsufficientBalance { current, required }) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "Insufficient wallet balance",
                    "data": { "currentBalance": current, "requiredAmount": required },
                })),
            )
                .into_response(),
            other => {
                let (status, message) = other.status_and_message();
                if status.is_server_error() {
                    tracing::error!(error = %other, "Request failed");
                }
                (
                    status,
                    Json(json!({ "success": false, "message": message })),
                )
                    .into_response()
            }
        }
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature".to_string()),
            Self::Auth(err) => (err.status(), err.public_message()),
            Self::Repository(err) => match err {
                RepositoryError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                RepositoryError::AlreadyExists(_)
                | RepositoryError::InvalidState(_)
                | RepositoryError::InsufficientBalance { .. } => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
            },
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use rust_decimal::Decimal;

    use super::*;

    async fn body(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_lists_field_errors() {
        let (status, json) = body(AppError::Validation(vec![FieldError::new(
            "email",
            "Valid email is required",
        )]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "email");
        assert_eq!(json["errors"][0]["message"], "Valid email is required");
    }

    #[tokio::test]
    async fn internal_errors_are_masked() {
        let (status, json) = body(AppError::Internal("lock poisoned".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Internal server error");
    }

    #[tokio::test]
    async fn insufficient_balance_reports_amounts() {
        let (status, json) = body(AppError::Repository(RepositoryError::InsufficientBalance {
            current: Decimal::from(500_000),
            required: Decimal::from(750_000),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["data"]["currentBalance"], 500_000.0);
        assert_eq!(json["data"]["requiredAmount"], 750_000.0);
    }

    #[tokio::test]
    async fn repository_errors_map_to_status() {
        let (status, json) = body(RepositoryError::NotFound("Order".to_string()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Order not found");

        let (status, _) = body(AppError::InvalidSignature).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
