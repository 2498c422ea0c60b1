//! crates/coursemate_core/src/service.rs
//!
//! The facade exposed to collaborators (chat front-end, REST surface):
//! submit a quiz request, poll a job, fetch the resulting quiz.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::admission::{Admission, AdmissionController, QuizRequest};
use crate::domain::{Job, JobResult, JobStatus, JobType, Quiz};
use crate::error::{JobQueryError, SubmissionError};
use crate::ports::JobStore;

/// What a poller sees for a job. Always well formed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

pub struct QuizJobService {
    admission: AdmissionController,
    store: Arc<dyn JobStore>,
}

impl QuizJobService {
    pub fn new(admission: AdmissionController, store: Arc<dyn JobStore>) -> Self {
        Self { admission, store }
    }

    pub async fn submit_quiz_generation(
        &self,
        request: QuizRequest,
    ) -> Result<Admission, SubmissionError> {
        self.admission.submit(request).await
    }

    pub async fn job_status(&self, job_id: Uuid) -> Result<JobStatusView, JobQueryError> {
        self.store
            .get_job(job_id)
            .await?
            .map(JobStatusView::from)
            .ok_or(JobQueryError::NotFound(job_id))
    }

    pub async fn quiz(&self, quiz_id: Uuid) -> Result<Quiz, JobQueryError> {
        self.store
            .get_quiz(quiz_id)
            .await?
            .ok_or(JobQueryError::NotFound(quiz_id))
    }
}
