pub mod rest;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use rest::{get_job_handler, get_quiz_handler, submit_quiz_job_handler, ApiDoc};
pub use state::AppState;

/// The quiz API routes, without documentation or CORS layers.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/quiz-jobs", post(submit_quiz_job_handler))
        .route("/jobs/{id}", get(get_job_handler))
        .route("/quizzes/{id}", get(get_quiz_handler))
        .with_state(app_state)
}
