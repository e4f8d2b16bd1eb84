use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Scan window out of range: {0}")]
    InvalidWindow(String),

    #[error("Device not authorized for offline scanning")]
    DeviceNotAuthorized,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Device id already registered: {0}")]
    DeviceIdExists(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Cache store error")]
    CacheError(#[from] redis::RedisError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            AppError::DeviceNotAuthorized => StatusCode::FORBIDDEN,
            AppError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TicketNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeviceIdExists(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::CacheError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidWindow(_) => "INVALID_WINDOW",
            AppError::DeviceNotAuthorized => "DEVICE_NOT_AUTHORIZED",
            AppError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            AppError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            AppError::DeviceIdExists(_) => "DEVICE_ID_EXISTS",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::CacheError(_) => "CACHE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::InvalidWindow(msg)
            | AppError::DeviceNotFound(msg)
            | AppError::TicketNotFound(msg)
            | AppError::DeviceIdExists(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DeviceNotAuthorized => {
                error!(error = ?self, "Device authorization denied");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::CacheError(e) => {
                error!(error = ?e, "Cache store error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client. The device
        // authorization message deliberately does not say whether the
        // device is missing, inactive, or offline-disabled.
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::InvalidWindow(msg)
            | AppError::DeviceNotFound(msg)
            | AppError::TicketNotFound(msg)
            | AppError::DeviceIdExists(msg)
            | AppError::InternalServerError(msg) => msg.clone(),
            AppError::DeviceNotAuthorized => {
                "Device is not authorized for this operation".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::CacheError(_) => "A cache store error occurred".to_string(),
        };

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_authorization_collapses_to_one_code() {
        // Missing, inactive, and offline-disabled devices all surface the
        // same way so device state cannot be probed.
        let err = AppError::DeviceNotAuthorized;
        assert_eq!(err.code(), "DEVICE_NOT_AUTHORIZED");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_window_violation_is_a_bad_request() {
        let err = AppError::InvalidWindow("1441 exceeds 1440".to_string());
        assert_eq!(err.code(), "INVALID_WINDOW");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_duplicate_device_id_is_a_conflict() {
        let err = AppError::DeviceIdExists("SCANNER-1".to_string());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
