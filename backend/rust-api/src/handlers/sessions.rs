use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::ApiError;
use crate::{
    error::QuizError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        session::{
            Navigation, ResumeSessionRequest, SelectAnswerRequest, SessionView,
            StartSessionRequest, SubmitOutcome,
        },
        Question,
    },
    services::{
        attempt_store::{AttemptStore, LocalAttemptStore, RemoteAttemptStore},
        quiz_session::QuizSession,
        AppState,
    },
};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub navigation: Navigation,
    pub session: SessionView,
}

/// POST /api/v1/sessions
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let backend = req.backend.unwrap_or(state.config.attempt_backend);
    tracing::info!(
        "Starting session: user={}, repository={}, backend={}, filter={:?}",
        claims.sub,
        req.repository_id,
        backend.as_str(),
        req.filter
    );

    let questions = state
        .questions
        .questions_for_repository(&req.repository_id)
        .await
        .map_err(QuizError::persistence)?;

    let store = state
        .open_store(backend, &claims.sub, &req.repository_id)
        .await?;
    let mut session = QuizSession::new(claims.sub.clone(), store, state.clock.clone());
    session.start(questions, &req.filter).await?;

    let view = session.view()?;
    state.sessions.insert(session)?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /api/v1/sessions/resume
pub async fn resume_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ResumeSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (store, questions): (Box<dyn AttemptStore>, Vec<Question>) =
        match (req.attempt_id, req.repository_id) {
            (Some(attempt_id), _) => {
                let (store, questions) =
                    RemoteAttemptStore::resume(state.attempts.clone(), &claims.sub, &attempt_id)
                        .await?;
                (Box::new(store) as Box<dyn AttemptStore>, questions)
            }
            (None, Some(repository_id)) => {
                let store = LocalAttemptStore::open(
                    state.local_storage.clone(),
                    &claims.sub,
                    &repository_id,
                )
                .await?;
                let questions = local_session_questions(&state, &store, &repository_id).await?;
                (Box::new(store) as Box<dyn AttemptStore>, questions)
            }
            (None, None) => {
                return Err(ApiError::BadRequest(
                    "Either attempt_id or repository_id is required".to_string(),
                ))
            }
        };

    let mut session = QuizSession::new(claims.sub.clone(), store, state.clock.clone());
    session.resume(questions)?;

    let view = session.view()?;
    state.sessions.insert(session)?;

    Ok((StatusCode::OK, Json(view)))
}

/// Questions of the unfinished local session, in their stored order.
async fn local_session_questions(
    state: &AppState,
    store: &LocalAttemptStore,
    repository_id: &str,
) -> Result<Vec<Question>, QuizError> {
    let ids = store.session_question_ids();
    if ids.is_empty() {
        return Err(QuizError::SessionNotFound(repository_id.to_string()));
    }

    let mut bank: HashMap<String, Question> = state
        .questions
        .questions_for_repository(repository_id)
        .await
        .map_err(QuizError::persistence)?
        .into_iter()
        .map(|q| (q.id.clone(), q))
        .collect();

    let questions: Vec<Question> = ids.iter().filter_map(|id| bank.remove(id)).collect();
    if questions.len() != ids.len() {
        tracing::warn!(
            "Local session for {} references {} missing questions",
            repository_id,
            ids.len() - questions.len()
        );
    }
    if questions.is_empty() {
        return Err(QuizError::SessionNotFound(repository_id.to_string()));
    }
    Ok(questions)
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&session_id, &claims.sub)?;
    let session = session.lock().await;
    Ok(Json(session.view()?))
}

/// POST /api/v1/sessions/{id}/select
pub async fn select_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SelectAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&session_id, &claims.sub)?;
    let mut session = session.lock().await;
    session.select_answer(req.display_index)?;
    Ok(Json(session.view()?))
}

/// POST /api/v1/sessions/{id}/submit
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&session_id, &claims.sub)?;
    let mut session = session.lock().await;
    let outcome = session.submit().await?;
    Ok(Json(SubmitResponse {
        outcome,
        session: session.view()?,
    }))
}

/// POST /api/v1/sessions/{id}/next
pub async fn next_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shared = state.sessions.get(&session_id, &claims.sub)?;
    let mut session = shared.lock().await;
    let navigation = session.next().await?;
    let view = session.view()?;
    drop(session);

    if matches!(navigation, Navigation::Completed { .. }) {
        state.sessions.remove(&session_id)?;
    }

    Ok(Json(NavigationResponse {
        navigation,
        session: view,
    }))
}

/// POST /api/v1/sessions/{id}/previous
pub async fn previous_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&session_id, &claims.sub)?;
    let mut session = session.lock().await;
    let navigation = session.previous()?;
    Ok(Json(NavigationResponse {
        navigation,
        session: session.view()?,
    }))
}

/// POST /api/v1/sessions/{id}/complete
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shared = state.sessions.get(&session_id, &claims.sub)?;
    let summary = shared.lock().await.complete().await?;
    state.sessions.remove(&session_id)?;
    Ok(Json(summary))
}
