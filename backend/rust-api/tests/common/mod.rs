#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use sabuho_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{AnswerOption, Question},
    services::{
        attempt_store::memory::InMemoryAttemptRepository,
        question_service::InMemoryQuestionRepository, AppState,
    },
    utils::time::ManualClock,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const REPOSITORY_ID: &str = "repo-geography";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub attempts: Arc<InMemoryAttemptRepository>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn token_for(&self, user_id: &str) -> String {
        JwtService::new(&self.state.config.jwt_secret)
            .generate_token(&JwtClaims::for_user(user_id, 3600))
            .expect("token")
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::for_tests())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let bank = seed_questions();
    let questions = Arc::new(InMemoryQuestionRepository::new(bank.clone()));
    let attempts = Arc::new(InMemoryAttemptRepository::default());
    attempts.insert_questions(bank);
    let clock = Arc::new(ManualClock::default());

    let state = Arc::new(
        AppState::in_memory(config, questions, attempts.clone(), clock.clone())
            .expect("Failed to initialize test app state"),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        attempts,
        clock,
    }
}

/// Three questions in one repository plus one in another.
pub fn seed_questions() -> Vec<Question> {
    let mut capital = Question::new(
        "q-capital",
        "Capital of France?",
        vec![
            AnswerOption::new("Paris", true),
            AnswerOption::new("Lyon", false),
            AnswerOption::new("Nice", false),
        ],
    );
    capital.explanation = Some("Paris has been the capital since 987.".to_string());

    let river = Question::new(
        "q-river",
        "Longest river in Europe?",
        vec![
            AnswerOption::new("Danube", false),
            AnswerOption::new("Volga", true),
        ],
    );

    let peak = Question::new(
        "q-peak",
        "Highest peak in the Alps?",
        vec![
            AnswerOption::new("Matterhorn", false),
            AnswerOption::new("Mont Blanc", true),
            AnswerOption::new("Eiger", false),
            AnswerOption::new("Dom", false),
        ],
    );

    let mut other = Question::new(
        "q-other",
        "Unrelated question",
        vec![AnswerOption::new("Yes", true), AnswerOption::new("No", false)],
    );
    other.repository_id = Some("repo-other".to_string());

    let mut bank: Vec<Question> = [capital, river, peak]
        .into_iter()
        .map(|mut q| {
            q.repository_id = Some(REPOSITORY_ID.to_string());
            q
        })
        .collect();
    bank.push(other);
    bank
}

pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    (status, json)
}

/// Display index of the correct option in the current question view.
pub fn correct_display_index(view: &Value, bank: &[Question]) -> usize {
    let question_id = view["question"]["id"].as_str().unwrap();
    let question = bank.iter().find(|q| q.id == question_id).unwrap();
    let correct_text = &question.options[question.correct_index().unwrap()].text;
    view["question"]["options"]
        .as_array()
        .unwrap()
        .iter()
        .position(|o| o.as_str() == Some(correct_text.as_str()))
        .unwrap()
}
