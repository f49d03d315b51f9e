use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{AsRefStr, Display};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::{
    completion_writer::PersistenceError, payment_capture::CaptureError, WebhookError,
};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body for non check-out endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Not found: booking 550e8400-e29b-41d4-a716-446655440000",
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-01T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::MigrationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::MigrationError(_) => "Internal server error".to_string(),
            Self::ExternalServiceError(_) => "Upstream service error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// Failure classes reported to check-out callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    NotFound,
    CaptureFailed,
    PersistenceAfterCapture,
    Internal,
}

/// Everything the check-out orchestrator can fail with. Collaborator errors
/// are wrapped here so none reach the caller unclassified.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("booking {0} not found")]
    NotFound(Uuid),

    #[error("payment capture failed: {0}")]
    CaptureFailed(#[source] CaptureError),

    #[error("payment captured but booking completion was not persisted: {0}")]
    PersistenceAfterCapture(#[source] PersistenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::CaptureFailed(_) => ErrorClass::CaptureFailed,
            Self::PersistenceAfterCapture(_) => ErrorClass::PersistenceAfterCapture,
            Self::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CaptureFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PersistenceAfterCapture(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caller-facing text. Processor and storage details stay in the logs and
    /// in the operator alerts.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(_) => "booking not found".to_string(),
            Self::CaptureFailed(_) => "payment could not be captured".to_string(),
            Self::PersistenceAfterCapture(_) => "check-out could not be confirmed".to_string(),
            Self::Internal(_) => "internal error".to_string(),
        }
    }
}

impl From<DbErr> for CheckoutError {
    fn from(err: DbErr) -> Self {
        CheckoutError::Internal(err.to_string())
    }
}

/// `{success: false, error, error_class}` body returned by the check-out endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutFailure {
    pub success: bool,
    pub error: String,
    pub error_class: ErrorClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let body = CheckoutFailure {
            success: false,
            error: self.user_message(),
            error_class: self.error_class(),
            request_id: current_request_id(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// `{received: false, error}` body returned for rejected webhook deliveries.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookRejection {
    pub received: bool,
    pub error: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if status.is_server_error() {
            "event could not be recorded".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(WebhookRejection {
                received: false,
                error,
            }),
        )
            .into_response()
    }
}
