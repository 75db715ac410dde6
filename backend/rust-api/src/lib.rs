use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::QuizError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest(
            "/api/v1",
            api_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(middlewares::trace::trace_context_middleware))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(handlers::sessions::start_session))
        .route("/sessions/resume", post(handlers::sessions::resume_session))
        .route("/sessions/{id}", get(handlers::sessions::get_session))
        .route(
            "/sessions/{id}/select",
            post(handlers::sessions::select_answer),
        )
        .route(
            "/sessions/{id}/submit",
            post(handlers::sessions::submit_answer),
        )
        .route("/sessions/{id}/next", post(handlers::sessions::next_question))
        .route(
            "/sessions/{id}/previous",
            post(handlers::sessions::previous_question),
        )
        .route(
            "/sessions/{id}/complete",
            post(handlers::sessions::complete_session),
        )
        .route(
            "/processing/{id}",
            get(handlers::processing::get_processing_status),
        )
}
