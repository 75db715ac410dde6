use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

#[derive(Clone, Debug)]
pub struct RequestTraceContext {
    pub trace_id: String,
}

/// Reuses or issues an `x-trace-id`, echoes it on the response and runs the
/// request inside a span carrying it.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestTraceContext {
        trace_id: trace_id.clone(),
    });

    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path()
    );
    let mut response = next.run(request).instrument(span).await;

    if response.headers().get(TRACE_ID_HEADER).is_none() {
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
    }

    response
}
