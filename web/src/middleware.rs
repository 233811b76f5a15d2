//! Trace id middleware.
//!
//! 1. **Extract** the trace id from the `X-Trace-Id` request header, or
//!    generate one
//! 2. **Store** it in request extensions as [`TraceId`]
//! 3. **Run** the request inside an `http_request` span carrying it
//! 4. **Inject** it into the `X-Trace-Id` response header, errors included
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use nexus_web::middleware::trace_id_layer;
//!
//! let app = Router::new()
//!     .route("/api/docking/bays", get(list_bays))
//!     .layer(trace_id_layer());
//! ```

use crate::extractors::TraceId;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for the trace id (`X-Trace-Id`, lowercased as on the wire).
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Longest inbound trace id that is propagated as-is.
const MAX_TRACE_ID_LEN: usize = 128;

/// Accept a caller-supplied trace id if it is short visible ASCII.
fn inbound_trace_id(value: &HeaderValue) -> Option<String> {
    let s = value.to_str().ok()?.trim();
    let usable = !s.is_empty()
        && s.len() <= MAX_TRACE_ID_LEN
        && s.bytes().all(|b| b.is_ascii_graphic());
    usable.then(|| s.to_string())
}

/// Create a layer that adds trace id tracking to all requests.
#[must_use]
pub const fn trace_id_layer() -> TraceIdLayer {
    TraceIdLayer
}

/// Layer for trace id tracking.
#[derive(Clone, Debug)]
pub struct TraceIdLayer;

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdMiddleware { inner }
    }
}

/// Middleware service for trace id tracking.
#[derive(Clone, Debug)]
pub struct TraceIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for TraceIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let trace_id = req
            .headers()
            .get(TRACE_ID_HEADER)
            .and_then(inbound_trace_id)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        req.extensions_mut().insert(TraceId(trace_id.clone()));

        let span = tracing::info_span!(
            "http_request",
            trace_id = %trace_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&trace_id) {
                response.headers_mut().insert(TRACE_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/test", get(|trace: TraceId| async move { trace.0 }))
            .layer(trace_id_layer())
    }

    #[tokio::test]
    async fn trace_id_generated_if_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        let trace_id = response
            .headers()
            .get(TRACE_ID_HEADER)
            .expect("Trace id header should be present")
            .to_str()
            .unwrap();
        assert_eq!(trace_id.len(), 32);
        assert!(trace_id.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn trace_id_propagated_from_request() {
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, "4bf92f3577b34da6a3ce929d0e0e4736")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(TRACE_ID_HEADER).unwrap(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[tokio::test]
    async fn unusable_trace_id_is_replaced() {
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, "has spaces")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        let trace_id = response.headers().get(TRACE_ID_HEADER).unwrap();
        assert_ne!(trace_id, "has spaces");
    }
}
