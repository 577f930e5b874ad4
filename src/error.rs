//! Error handling

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Errors raised by the record store and query engine
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid page number: {0}")]
    InvalidPage(String),

    #[error("invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("unsupported database url: {0}")]
    UnsupportedDatabase(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Rows were removed but reclaiming their space failed. The delete stands.
    #[error("{removed} records deleted but space reclamation failed: {source}")]
    Reclaim {
        removed: u64,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    Unauthorized,

    // Resource errors
    NotFound(String),
    AlreadyExists(String),

    // Validation errors
    ValidationError(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", msg))
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "status": "failed",
            "error": error_message,
            "result": null
        }));

        (status, body).into_response()
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::InvalidPage(_) | RecordError::InvalidAnchor(_) => {
                AppError::ValidationError(err.to_string())
            }
            RecordError::Database(e) => AppError::from(e),
            RecordError::Reclaim { .. } | RecordError::UnsupportedDatabase(_) => {
                AppError::DatabaseError(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::AlreadyExists(db_err.message().to_string());
            }
        }
        AppError::DatabaseError(err.to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_page_is_bad_request() {
        let err: AppError = RecordError::InvalidPage("abc".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_reclaim_failure_reports_removed_count() {
        let err = RecordError::Reclaim {
            removed: 3,
            source: sqlx::Error::PoolClosed,
        };
        assert!(err.to_string().starts_with("3 records deleted"));

        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
