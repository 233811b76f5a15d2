//! Custom Axum extractors.
//!
//! # Examples
//!
//! ```ignore
//! use nexus_web::extractors::TraceId;
//!
//! async fn handler(trace: TraceId, State(state): State<AppState>) -> Result<Json<Receipt>, AppError> {
//!     tracing::info!(trace_id = %trace, "Docking");
//!     ...
//! }
//! ```

use crate::middleware::TRACE_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::fmt;
use uuid::Uuid;

/// Trace id of the current request.
///
/// Taken from request extensions when the trace id middleware is installed,
/// else from the `X-Trace-Id` header, else freshly generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(trace_id) = parts.extensions.get::<Self>() {
            return Ok(trace_id.clone());
        }

        let trace_id = parts
            .headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map_or_else(|| Uuid::new_v4().simple().to_string(), str::to_string);

        Ok(Self(trace_id))
    }
}
