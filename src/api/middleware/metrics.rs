use super::request_id::REQUEST_ID_HEADER;
use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Detection calls legitimately take minutes; anything slower than this on
/// the other routes is worth a warning.
const SLOW_REQUEST: Duration = Duration::from_secs(30);

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        target: "metrics",
        method = %method,
        path = %path,
        request_id = %request_id,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "request_completed"
    );

    if latency > SLOW_REQUEST && !path.starts_with("/process") {
        warn!(target: "metrics", path = %path, latency_ms = %latency.as_millis(), "slow_request");
    }

    response
}
