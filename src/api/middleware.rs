use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;

pub const X_TRACE_ID: &str = "x-trace-id";

/// Any origin unless `NIRVANA_CORS_ORIGINS` lists some.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let layer = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Per-request span keyed by a trace id, echoed back in `x-trace-id`.
/// Bodies pass through untouched so chat answers keep streaming.
pub async fn trace_requests(mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        if let Some(value) = &header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }
        let mut response = next.run(req).await;
        if let Some(value) = header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }
        info!(
            status = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}
