//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use coursemate_core::{
    AdmissionKind, Difficulty, JobQueryError, JobStatusView, Quiz, QuizRequest, SubmissionError,
    TimeBucket,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_quiz_job_handler,
        get_job_handler,
        get_quiz_handler,
    ),
    components(
        schemas(
            SubmitQuizJobRequest,
            SubmitQuizJobResponse,
            JobStatusResponse,
            JobResultResponse,
            QuizResponse
        )
    ),
    tags(
        (name = "CourseMate Quiz API", description = "Asynchronous quiz generation jobs.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A request for a personalized quiz over one course time-bucket.
#[derive(Deserialize, ToSchema)]
pub struct SubmitQuizJobRequest {
    pub course_id: i64,
    /// A week label, or `all` for every week of the course.
    pub time_bucket: String,
    pub requester_id: i64,
    /// `easy`, `medium` or `hard`; anything else means `medium`.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Clamped to 1..=20; the server default applies when omitted.
    #[serde(default)]
    pub question_count: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmitQuizJobResponse {
    pub job_id: Uuid,
    /// `created`, `in_flight` or `already_completed`.
    #[schema(value_type = String)]
    pub admission: AdmissionKind,
}

#[derive(Serialize, ToSchema)]
pub struct JobResultResponse {
    pub quiz_id: Uuid,
    pub num_questions: usize,
    pub material_count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    /// `pending`, `running`, `completed` or `failed`.
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResultResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobStatusView> for JobStatusResponse {
    fn from(view: JobStatusView) -> Self {
        Self {
            id: view.id,
            job_type: view.job_type.to_string(),
            status: view.status.to_string(),
            created_at: view.created_at,
            completed_at: view.completed_at,
            result: view.result.map(|r| JobResultResponse {
                quiz_id: r.quiz_id,
                num_questions: r.num_questions,
                material_count: r.material_count,
            }),
            error: view.error,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuizResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub course_id: i64,
    pub time_bucket: String,
    pub requester_id: i64,
    pub difficulty: String,
    /// Tagged by `type`: `mcq` items carry four `choices` and an `answer` index,
    /// `short` items carry a text `answer`.
    #[schema(value_type = Vec<Object>)]
    pub questions: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

impl QuizResponse {
    fn from_domain(quiz: Quiz) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: quiz.id,
            job_id: quiz.job_id,
            course_id: quiz.course_id,
            time_bucket: quiz.time_bucket.to_string(),
            requester_id: quiz.requester_id,
            difficulty: quiz.difficulty.to_string(),
            questions: serde_json::to_value(&quiz.questions)?,
            generated_at: quiz.generated_at,
        })
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a quiz generation job.
///
/// Returns at once with the id of the job that satisfies the request: a new
/// job, an equivalent job still in flight, or an already completed one.
#[utoipa::path(
    post,
    path = "/quiz-jobs",
    request_body = SubmitQuizJobRequest,
    responses(
        (status = 202, description = "Request admitted", body = SubmitQuizJobResponse),
        (status = 400, description = "Bad request (e.g., empty time bucket)"),
        (status = 503, description = "The worker pool is shutting down"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn submit_quiz_job_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SubmitQuizJobRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if payload.time_bucket.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "time_bucket must not be empty".to_string(),
        ));
    }

    let request = QuizRequest {
        course_id: payload.course_id,
        time_bucket: TimeBucket::parse(&payload.time_bucket),
        requester_id: payload.requester_id,
        difficulty: payload
            .difficulty
            .as_deref()
            .map(Difficulty::parse_lenient)
            .unwrap_or_default(),
        question_count: payload.question_count,
    };

    match app_state.service.submit_quiz_generation(request).await {
        Ok(admission) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitQuizJobResponse {
                job_id: admission.job_id,
                admission: admission.kind,
            }),
        )),
        Err(SubmissionError::PoolClosed(_)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Quiz generation is shutting down, try again later".to_string(),
        )),
        Err(e) => {
            error!("Failed to submit quiz job: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to submit quiz job".to_string(),
            ))
        }
    }
}

/// Get the status of a job.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 404, description = "Job not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The job id returned on submission.")
    )
)]
pub async fn get_job_handler(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = app_state
        .service
        .job_status(job_id)
        .await
        .map_err(query_error)?;
    Ok(Json(JobStatusResponse::from(view)))
}

/// Get a generated quiz.
#[utoipa::path(
    get,
    path = "/quizzes/{id}",
    responses(
        (status = 200, description = "The generated quiz", body = QuizResponse),
        (status = 404, description = "Quiz not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("id" = Uuid, Path, description = "The quiz id from a completed job's result.")
    )
)]
pub async fn get_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    Path(quiz_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quiz = app_state.service.quiz(quiz_id).await.map_err(query_error)?;
    let response = QuizResponse::from_domain(quiz).map_err(|e| {
        error!("Failed to encode quiz {}: {:?}", quiz_id, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode quiz".to_string(),
        )
    })?;
    Ok(Json(response))
}

fn query_error(e: JobQueryError) -> (StatusCode, String) {
    match e {
        JobQueryError::NotFound(id) => (StatusCode::NOT_FOUND, format!("{} not found", id)),
        JobQueryError::Store(e) => {
            error!("Job store lookup failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read job store".to_string(),
            )
        }
    }
}
