//! Error types for the esign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use esign_core::StampError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Missing or unknown caller")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Stamp(#[from] StampError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or unknown caller".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.to_string()),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Stamp(e) => match e {
                StampError::Decode(_) | StampError::SourceDocument(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }
                StampError::OutputWrite(_) | StampError::Asset(_) => {
                    tracing::error!("Stamping failed: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Could not write signed document".to_string(),
                    )
                }
            },
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_errors_map_by_cause() {
        let bad_pdf = ApiError::from(StampError::SourceDocument("truncated".into()));
        assert_eq!(
            bad_pdf.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let disk = ApiError::from(StampError::OutputWrite("disk full".into()));
        assert_eq!(
            disk.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_conflict_status() {
        let err = ApiError::Conflict("busy".into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
