use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::error::QuizError;
use crate::metrics;
use crate::services::processing_service::ProcessingError;
use crate::services::AppState;

pub mod processing;
pub mod sessions;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        let message = err.to_string();
        match err {
            QuizError::EmptySelection
            | QuizError::NoAnswerSelected
            | QuizError::InvalidOption { .. } => ApiError::BadRequest(message),
            QuizError::SessionNotFound(_) => ApiError::NotFound(message),
            QuizError::Forbidden => ApiError::Forbidden(message),
            QuizError::SessionNotStarted
            | QuizError::SessionAlreadyStarted
            | QuizError::SessionCompleted => ApiError::Conflict(message),
            QuizError::RemoteWriteFailure { .. } => ApiError::BadGateway(message),
            QuizError::StorageFailure(_)
            | QuizError::InvalidScrambleState { .. }
            | QuizError::Persistence(_) => {
                tracing::error!("Quiz engine failure: {}", message);
                ApiError::Internal(message)
            }
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::BadGateway(format!("{:#}", other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let json_response = json!({
            "message": message,
            "status": status.as_u16()
        });
        (status, Json(json_response)).into_response()
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();
    let mut all_healthy = true;

    let mongo_health = check_mongodb(&state).await;
    all_healthy &= is_usable(&mongo_health);
    dependencies.insert("mongodb".to_string(), json!(mongo_health));

    let redis_health = check_redis(&state).await;
    all_healthy &= is_usable(&redis_health);
    dependencies.insert("redis".to_string(), json!(redis_health));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "sabuho-api",
            "version": env!("CARGO_PKG_VERSION"),
            "attempt_backend": state.config.attempt_backend.as_str(),
            "local_store": state.local_storage.kind(),
            "active_sessions": state.sessions.len(),
            "dependencies": dependencies
        })),
    )
}

fn is_usable(health: &serde_json::Map<String, serde_json::Value>) -> bool {
    matches!(
        health.get("status").and_then(|v| v.as_str()),
        Some("healthy") | Some("not_configured")
    )
}

fn status_entry(status: &str, key: &str, text: String) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();
    result.insert("status".to_string(), json!(status));
    result.insert(key.to_string(), json!(text));
    result
}

async fn check_mongodb(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let Some(mongo) = &state.mongo else {
        return status_entry("not_configured", "message", "In-memory repositories".to_string());
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(1),
        mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => status_entry("healthy", "message", "MongoDB connection successful".to_string()),
        Ok(Err(e)) => status_entry("unhealthy", "error", format!("MongoDB error: {}", e)),
        Err(_) => status_entry("unhealthy", "error", "MongoDB timeout after 1s".to_string()),
    }
}

async fn check_redis(state: &AppState) -> serde_json::Map<String, serde_json::Value> {
    let Some(redis) = &state.redis else {
        return status_entry("not_configured", "message", "Redis not configured".to_string());
    };

    let mut conn = redis.clone();
    match tokio::time::timeout(
        std::time::Duration::from_millis(500),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => status_entry("healthy", "message", "Redis connection successful".to_string()),
        Ok(Err(e)) => status_entry("unhealthy", "error", format!("Redis error: {}", e)),
        Err(_) => status_entry("unhealthy", "error", "Redis timeout after 500ms".to_string()),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// HTTP Basic Auth for `/metrics`; expected `user:password` comes from `METRICS_AUTH`.
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_errors_map_to_statuses() {
        let cases = [
            (QuizError::EmptySelection, StatusCode::BAD_REQUEST),
            (QuizError::SessionNotFound("x".into()), StatusCode::NOT_FOUND),
            (QuizError::Forbidden, StatusCode::FORBIDDEN),
            (QuizError::SessionCompleted, StatusCode::CONFLICT),
            (
                QuizError::RemoteWriteFailure {
                    question_id: "q".into(),
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (QuizError::StorageFailure("full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
