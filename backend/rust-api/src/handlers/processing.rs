use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::ApiError;
use crate::services::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProcessingQuery {
    /// Block until the job is `completed` or `failed`.
    #[serde(default)]
    pub wait: bool,
}

/// GET /api/v1/processing/{id}
pub async fn get_processing_status(
    State(state): State<Arc<AppState>>,
    Path(resource_session_id): Path<String>,
    Query(query): Query<ProcessingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = if query.wait {
        state
            .processing
            .wait_until_terminal(&resource_session_id)
            .await?
    } else {
        state.processing.fetch_status(&resource_session_id).await?
    };

    Ok(Json(snapshot))
}
