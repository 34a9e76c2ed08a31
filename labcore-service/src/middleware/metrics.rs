//! HTTP request metrics.

use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL};
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Count requests per route pattern and status; server errors feed the
/// alerting counter.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    let status = response.status();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&route, status.as_str()])
        .inc();
    if status.is_server_error() {
        ERRORS_TOTAL.with_label_values(&["http_5xx"]).inc();
    }

    response
}
