use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per normalized route.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Replaces id-like segments with `{id}` to keep label cardinality bounded.
/// The segment after `processing` is an opaque resource-session id.
fn normalize_path(path: &str) -> String {
    let mut after_processing = false;
    path.split('/')
        .map(|segment| {
            let id_like = after_processing || is_uuid_like(segment) || is_numeric_id(segment);
            after_processing = segment == "processing";
            if id_like && !segment.is_empty() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// 8-4-4-4-12 hex
fn is_uuid_like(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
