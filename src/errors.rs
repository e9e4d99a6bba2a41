use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::error;
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// How much of an error's internals a client gets to see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorDisclosure {
    /// Server-side failures are reduced to a generic message.
    #[default]
    Redacted,
    /// Raw error text and a debug rendering of the error are returned.
    Verbose,
}

tokio::task_local! {
    static ERROR_DISCLOSURE: ErrorDisclosure;
}

/// Runs `future` with the given disclosure level visible to `IntoResponse`.
pub async fn scope_error_disclosure<Fut, R>(disclosure: ErrorDisclosure, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    ERROR_DISCLOSURE.scope(disclosure, future).await
}

/// Disclosure level of the current request; redacted outside a scope.
pub fn current_error_disclosure() -> ErrorDisclosure {
    ERROR_DISCLOSURE.try_with(|d| *d).unwrap_or_default()
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "error": "Order validation failed",
    "details": ["Line 2: quantity must be between 1 and 10000"],
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human-readable error summary
    pub error: String,
    /// Per-field validation messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// Debug rendering of the error, development only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Failed to {operation}: {source}")]
    WriteFailed {
        operation: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{summary}")]
    ValidationFailed {
        summary: String,
        details: Vec<String>,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();
        ServiceError::ValidationFailed {
            summary: "Validation failed".to_string(),
            details,
        }
    }
}

impl ServiceError {
    /// Convenience constructor for a failed store write.
    pub fn write_failed(operation: &'static str, source: DbErr) -> Self {
        ServiceError::WriteFailed { operation, source }
    }

    pub fn validation(summary: impl Into<String>, details: Vec<String>) -> Self {
        ServiceError::ValidationFailed {
            summary: summary.into(),
            details,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed { .. } | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::DatabaseError(_)
            | Self::WriteFailed { .. }
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Redacted output never contains store or driver text.
    pub fn response_message(&self, disclosure: ErrorDisclosure) -> String {
        if disclosure == ErrorDisclosure::Verbose {
            return self.to_string();
        }
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::WriteFailed { operation, .. } => format!("Failed to {}", operation),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Field-level messages, present only for validation failures.
    pub fn details(&self) -> Option<Vec<String>> {
        match self {
            Self::ValidationFailed { details, .. } => Some(details.clone()),
            _ => None,
        }
    }

    fn debug_rendering(&self, disclosure: ErrorDisclosure) -> Option<String> {
        if disclosure == ErrorDisclosure::Verbose && self.status_code().is_server_error() {
            Some(format!("{:?}", self))
        } else {
            None
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let disclosure = current_error_disclosure();
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.response_message(disclosure),
            details: self.details(),
            debug: self.debug_rendering(disclosure),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimitExceeded { retry_after_secs } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs.max(1)),
            );
        }
        response
    }
}
