//! HTTP surface: `GET /metrics` and nothing else.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::Router;
use axum::body::HttpBody;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use crate::limiter::RateLimiter;

pub(crate) const METRICS_PATH: &str = "/metrics";

/// Builds the exporter router.
///
/// Request filtering, outermost first: rate limit (429), method (405),
/// path (404), body (400).
pub(crate) fn router(registry: Registry, limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(handle_metrics))
        .with_state(registry)
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn_with_state(limiter, guard_request))
        .layer(AccessLogLayer)
}

async fn handle_metrics(State(registry): State<Registry>) -> Response {
    let families = match tokio::task::spawn_blocking(move || registry.gather()).await {
        Ok(families) => families,
        Err(e) => {
            error!(error = %e, "metrics collection task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn guard_request(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.allow() {
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests\n").into_response();
    }
    if req.method() != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if req.uri().path() != METRICS_PATH {
        return StatusCode::NOT_FOUND.into_response();
    }
    if has_body(&req) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    next.run(req).await
}

fn has_body(req: &Request) -> bool {
    let headers = req.headers();
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0);
    declared || !req.body().is_end_stream()
}

/// Logs one line per scrape, rejected requests included.
#[derive(Clone)]
pub(crate) struct AccessLogLayer;

impl<S> tower::Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub(crate) struct AccessLogService<S> {
    inner: S,
}

impl<S> tower::Service<Request> for AccessLogService<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().clone();
        let uri_path = req.uri().path().to_owned();
        let client = req
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "-".to_owned());
        let t0 = Instant::now();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            let status = response.status().as_u16();
            let elapsed_ms = t0.elapsed().as_millis() as u64;
            info!(client, status, elapsed_ms, "{method} {uri_path}");
            Ok(response)
        })
    }
}
