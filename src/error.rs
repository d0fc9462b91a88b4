use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Message returned for every authentication failure, whatever the cause.
pub const AUTHENTICATION_MESSAGE: &str = "invalid or expired credentials";

/// StoreError
///
/// Failures raised by a repository implementation. Uniqueness and missing-reference
/// violations carry meaning for callers; everything else is opaque and must not reach the
/// client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A write pointed at a row that no longer exists (foreign key constraint name).
    #[error("referenced row missing: {0}")]
    MissingReference(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store state unavailable")]
    Poisoned,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::MissingReference(constraint);
            }
        }
        StoreError::Database(err.to_string())
    }
}

/// AppError
///
/// The domain error taxonomy. Every operation in the crate returns this, and the HTTP
/// boundary renders it into the uniform error envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Missing, malformed, expired or wrong credential proof. Carries no detail on purpose.
    #[error("authentication failed")]
    Authentication,

    #[error("forbidden: {0}")]
    Authorization(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Authorization(msg.into())
    }

    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{resource} {id} not found"))
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation",
            AppError::Authentication => "authentication",
            AppError::Authorization(_) => "authorization",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Authentication => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                AppError::Conflict(conflict_message(&constraint))
            }
            // Only an account deleted after its token was issued can leave a dangling user id.
            StoreError::MissingReference(constraint) if references_user(&constraint) => {
                AppError::Authentication
            }
            StoreError::MissingReference(_) => {
                AppError::NotFound("referenced resource not found".to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

fn references_user(constraint: &str) -> bool {
    constraint.contains("user_id") || constraint.contains("author_id")
}

fn conflict_message(constraint: &str) -> String {
    if constraint.contains("email") {
        "email is already registered".to_string()
    } else if constraint.contains("username") {
        "username is already taken".to_string()
    } else if constraint.contains("slug") {
        "a blog with this slug already exists".to_string()
    } else {
        "resource already exists".to_string()
    }
}

/// ErrorEnvelope
///
/// `{"error": {"kind": "...", "message": "...", "field": "..."}}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind().to_string();

        let (message, field) = match self {
            AppError::Validation { field, message } => (message, Some(field)),
            AppError::Authentication => (AUTHENTICATION_MESSAGE.to_string(), None),
            AppError::Authorization(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => {
                (msg, None)
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ("an internal error occurred".to_string(), None)
            }
        };

        let body = ErrorEnvelope {
            error: ErrorBody {
                kind,
                message,
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}
