//! Error types for web handlers.
//!
//! [`AppError`] is the single error type handlers return. Business
//! rejections become 409 (or 400 for malformed input) carrying the
//! rejection's stable code; faults become 404, 503 or a generic 500 whose
//! detail is logged and never sent to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use nexus_core::{FacilityError, Outcome, Rejection};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Receipt>, AppError> {
///     let receipt = completed(state.docking.dock(ship_id).await?)?;
///     Ok(Json(receipt))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        metrics::counter!(
            "nexus.http.errors",
            "status" => self.status.as_u16().to_string(),
            "code" => self.code.clone(),
        )
        .increment(1);

        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        let status = if rejection.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::CONFLICT
        };
        Self::new(status, rejection.to_string(), rejection.code().to_string())
    }
}

impl From<FacilityError> for AppError {
    fn from(err: FacilityError) -> Self {
        match err {
            FacilityError::NotFound { entity, id } => Self::not_found(entity, id),
            FacilityError::DownstreamUnavailable { ref collaborator, .. } => {
                Self::unavailable(format!("{collaborator} service is unavailable"))
                    .with_source(err.into())
            }
            FacilityError::LockTimeout { .. } => {
                Self::unavailable("Resource is busy, retry later").with_source(err.into())
            }
            FacilityError::DataInconsistency(_)
            | FacilityError::Store(_)
            | FacilityError::KeyValue(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Unwrap a completed outcome, turning a rejection into its HTTP error.
///
/// # Errors
///
/// Returns the [`AppError`] for the rejection.
pub fn completed<T>(outcome: Outcome<T>) -> Result<T, AppError> {
    outcome.into_result().map_err(AppError::from)
}
