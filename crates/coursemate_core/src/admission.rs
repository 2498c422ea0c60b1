//! crates/coursemate_core/src/admission.rs
//!
//! Admission control: at most one non-terminal quiz job per
//! (job type, course, time bucket, requester), no re-run of satisfied work,
//! and a fresh job after a failure.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DedupKey, Difficulty, Job, JobScope, JobStatus, JobType, TimeBucket};
use crate::engine::{QuizJobRequest, WorkerPool};
use crate::error::SubmissionError;
use crate::ports::{InsertOutcome, JobStore};

/// Upper bound on questions per quiz.
pub const MAX_QUESTIONS: usize = 20;

/// A request for a personalized quiz.
#[derive(Debug, Clone)]
pub struct QuizRequest {
    pub course_id: i64,
    pub time_bucket: TimeBucket,
    pub requester_id: i64,
    pub difficulty: Difficulty,
    /// Falls back to the configured default when `None`.
    pub question_count: Option<usize>,
}

/// How a submission was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionKind {
    /// A new job was created and queued.
    Created,
    /// An equivalent job is still pending or running.
    InFlight,
    /// An equivalent job already completed; read its result instead.
    AlreadyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub job_id: Uuid,
    pub kind: AdmissionKind,
}

pub struct AdmissionController {
    store: Arc<dyn JobStore>,
    pool: Arc<WorkerPool>,
    default_question_count: usize,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn JobStore>, pool: Arc<WorkerPool>, default_question_count: usize) -> Self {
        Self {
            store,
            pool,
            default_question_count,
        }
    }

    /// Admits a quiz request, returning the id of the job that satisfies it.
    ///
    /// Never waits for generation: a new job is queued and its id returned at once.
    pub async fn submit(&self, request: QuizRequest) -> Result<Admission, SubmissionError> {
        let key = DedupKey {
            job_type: JobType::QuizGeneration,
            course_id: request.course_id,
            time_bucket: request.time_bucket.clone(),
            requester_id: request.requester_id,
        };

        if let Some(latest) = self.store.find_latest(&key).await? {
            match latest.status {
                JobStatus::Pending | JobStatus::Running => {
                    debug!(job_id = %latest.id, "Equivalent quiz job already in flight");
                    return Ok(Admission {
                        job_id: latest.id,
                        kind: AdmissionKind::InFlight,
                    });
                }
                JobStatus::Completed => {
                    return Ok(Admission {
                        job_id: latest.id,
                        kind: AdmissionKind::AlreadyCompleted,
                    });
                }
                JobStatus::Failed => {
                    debug!(job_id = %latest.id, "Previous quiz job failed, admitting a retry");
                }
            }
        }

        let job = Job::new(
            JobType::QuizGeneration,
            JobScope {
                course_id: request.course_id,
                time_bucket: request.time_bucket,
                requester_id: request.requester_id,
                material_id: None,
            },
        );

        // Lost a race with a concurrent submission for the same key.
        if let InsertOutcome::AlreadyInFlight(existing) = self.store.insert_if_absent(&job).await? {
            return Ok(Admission {
                job_id: existing.id,
                kind: AdmissionKind::InFlight,
            });
        }

        let job_id = job.id;
        let question_count = request
            .question_count
            .unwrap_or(self.default_question_count)
            .clamp(1, MAX_QUESTIONS);

        let dispatched = self.pool.dispatch(QuizJobRequest {
            job,
            difficulty: request.difficulty,
            question_count,
        });
        if let Err(e) = dispatched {
            self.abandon(job_id).await;
            return Err(e);
        }

        info!(
            job_id = %job_id,
            course_id = request.course_id,
            requester_id = request.requester_id,
            difficulty = %request.difficulty,
            question_count,
            "Submitted quiz generation job"
        );
        Ok(Admission {
            job_id,
            kind: AdmissionKind::Created,
        })
    }

    /// Terminates a job that was inserted but could not be queued, so its dedup
    /// key is released.
    async fn abandon(&self, job_id: Uuid) {
        let released = async {
            self.store.mark_running(job_id).await?;
            self.store
                .fail(job_id, "Quiz generation is unavailable: worker pool is shut down")
                .await
        }
        .await;
        if let Err(e) = released {
            warn!(job_id = %job_id, error = %e, "Could not release undispatched job");
        }
    }
}
