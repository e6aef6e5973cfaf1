use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request logging middleware
///
/// Reuses an incoming `x-request-id` or assigns one, and echoes it on the response.
pub async fn log_request(mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let request_id = match req.headers().get(REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => {
            let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            req.headers_mut().insert(REQUEST_ID_HEADER, generated.clone());
            generated
        }
    };

    let mut response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        request_id = request_id.to_str().unwrap_or_default(),
        duration_ms = %duration.as_millis(),
        "Request processed"
    );

    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}
