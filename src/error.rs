use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a user operation can surface to its caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database connection failed: {0}")]
    ConnectionFailure(#[source] sqlx::Error),

    #[error("{field} is already taken")]
    ConstraintViolation { field: &'static str },

    #[error("user not found")]
    NotFound,

    #[error("verification token is invalid")]
    TokenMismatch,

    #[error("verification token has expired")]
    TokenExpired,

    #[error("user is already verified")]
    AlreadyVerified,

    #[error("invalid {field}: {reason}")]
    ValidationFailure {
        field: &'static str,
        reason: String,
    },

    #[error("verification was sent recently, retry in {retry_after_secs}s")]
    ResendTooSoon { retry_after_secs: i64 },

    #[error("could not deliver verification: {0}")]
    Mailer(String),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl AppError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailure(_) => "connection_failure",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::NotFound => "not_found",
            Self::TokenMismatch => "token_mismatch",
            Self::TokenExpired => "token_expired",
            Self::AlreadyVerified => "already_verified",
            Self::ValidationFailure { .. } => "validation_failure",
            Self::ResendTooSoon { .. } => "resend_too_soon",
            Self::Mailer(_) => "mailer_failure",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ConstraintViolation { .. } => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TokenMismatch => StatusCode::BAD_REQUEST,
            Self::TokenExpired => StatusCode::GONE,
            Self::AlreadyVerified => StatusCode::CONFLICT,
            Self::ValidationFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ResendTooSoon { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Mailer(_) => StatusCode::BAD_GATEWAY,
            Self::ConnectionFailure(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Unique index name -> offending field.
fn constraint_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.contains("email") => "email",
        _ => "record",
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::ConstraintViolation {
                    field: constraint_field(db.constraint()),
                }
            }
            other => Self::Database(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // not-found and caller mistakes are ordinary outcomes
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "request failed");
        } else if status == StatusCode::NOT_FOUND {
            debug!(code = self.code(), "request rejected");
        } else {
            warn!(error = %self, code = self.code(), "request rejected");
        }

        let message = match &self {
            Self::ConnectionFailure(_) | Self::Database(_) | Self::Internal(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
