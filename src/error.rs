use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::session::SessionStatus;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The requested session does not exist.
    #[error("Session not found")]
    SessionNotFound,

    /// The caller is not the owning trainer, an enrolled student, or an admin.
    #[error("Access denied")]
    AccessDenied,

    /// The requested status change is not in the transition table.
    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// A mutation was attempted on a session that has already ended.
    #[error("Session already ended")]
    SessionAlreadyEnded,

    /// Aggregation found no booking that is paid, owned by the caller, and unclaimed.
    #[error("No eligible bookings")]
    NoEligibleBookings,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A room-token encoding error. Should not occur with valid inputs; treated as a bug.
    #[error("Token encoding error: {0}")]
    Encoding(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Migration(ref e) => {
                tracing::error!("Migration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Migration error".to_string())
            }

            AppError::SessionNotFound => {
                tracing::debug!("Session not found");
                (StatusCode::NOT_FOUND, "Session not found".to_string())
            }

            AppError::AccessDenied => {
                tracing::warn!("Access denied");
                (
                    StatusCode::FORBIDDEN,
                    "You do not have access to this session".to_string(),
                )
            }

            AppError::InvalidTransition { from, to } => {
                tracing::debug!("Invalid transition: {} -> {}", from, to);
                (
                    StatusCode::BAD_REQUEST,
                    format!("Cannot change session status from '{}' to '{}'", from, to),
                )
            }

            AppError::SessionAlreadyEnded => {
                tracing::debug!("Mutation attempted on ended session");
                (StatusCode::BAD_REQUEST, "Session already ended".to_string())
            }

            AppError::NoEligibleBookings => {
                tracing::debug!("Aggregation found no eligible bookings");
                (
                    StatusCode::BAD_REQUEST,
                    "No eligible bookings for this session".to_string(),
                )
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Encoding(ref msg) => {
                // Issuance never fails for valid inputs, so reaching this is a bug.
                tracing::error!("Token encoding error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Token encoding error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_their_status_codes() {
        let cases = [
            (AppError::SessionNotFound, StatusCode::NOT_FOUND),
            (AppError::AccessDenied, StatusCode::FORBIDDEN),
            (
                AppError::InvalidTransition {
                    from: SessionStatus::Active,
                    to: SessionStatus::Scheduled,
                },
                StatusCode::BAD_REQUEST,
            ),
            (AppError::SessionAlreadyEnded, StatusCode::BAD_REQUEST),
            (AppError::NoEligibleBookings, StatusCode::BAD_REQUEST),
            (
                AppError::Validation("bad input".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Encoding("payload too large".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
