//! crates/coursemate_core/src/engine.rs
//!
//! The execution engine: a fixed-size pool of workers pulling quiz jobs off an
//! unbounded queue and driving each one through aggregate -> generate -> persist
//! -> notify, with the job store recording every status transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::ContentAggregator;
use crate::domain::{Difficulty, Job, JobResult, Quiz};
use crate::error::{JobError, SubmissionError};
use crate::generation::QuizGenerator;
use crate::notifier::Notifier;
use crate::ports::{JobStore, PortError, PortResult};

/// Longest error message stored on a failed job.
pub const MAX_STORED_ERROR_CHARS: usize = 500;

const CLAIM_ATTEMPTS: u32 = 5;
const CLAIM_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A unit of work handed to the pool: the freshly inserted job plus the
/// generation parameters that are not part of its persisted scope.
#[derive(Debug, Clone)]
pub struct QuizJobRequest {
    pub job: Job,
    pub difficulty: Difficulty,
    pub question_count: usize,
}

//=========================================================================================
// Pipeline (what one worker does with one job)
//=========================================================================================

pub struct QuizPipeline {
    store: Arc<dyn JobStore>,
    aggregator: ContentAggregator,
    generator: QuizGenerator,
    notifier: Notifier,
}

impl QuizPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        aggregator: ContentAggregator,
        generator: QuizGenerator,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            aggregator,
            generator,
            notifier,
        }
    }

    /// Runs one job end to end. Never returns an error: every stage failure is
    /// recorded on the job as `failed`.
    pub async fn process(&self, request: QuizJobRequest) {
        let job_id = request.job.id;

        if let Err(e) = self.claim(job_id).await {
            error!(error = %e, "Could not claim job, skipping");
            return;
        }

        match self.run_stages(&request).await {
            Ok(quiz) => {
                info!(
                    quiz_id = %quiz.id,
                    questions = quiz.questions.len(),
                    "Quiz job completed"
                );
                self.notifier.notify_completed(&request.job, &quiz).await;
            }
            Err(e) => {
                let message = bounded_message(&e.to_string());
                error!(error = %message, "Quiz job failed");
                self.record_failure(job_id, &message).await;
                self.notifier.notify_failed(&request.job, &message).await;
            }
        }
    }

    /// Moves the job to `running`, retrying transient store errors. A job left
    /// `pending` keeps holding its dedup key.
    async fn claim(&self, job_id: Uuid) -> PortResult<()> {
        debug!(status = "running", "Job status transition");
        let mut attempt = 0;
        loop {
            match self.store.mark_running(job_id).await {
                Ok(()) => return Ok(()),
                // Already claimed or gone: retrying cannot help.
                Err(e @ (PortError::Conflict(_) | PortError::NotFound(_))) => return Err(e),
                Err(e) if attempt + 1 >= CLAIM_ATTEMPTS => return Err(e),
                Err(e) => {
                    let delay = CLAIM_RETRY_DELAY * 2u32.pow(attempt);
                    warn!(attempt = attempt + 1, error = %e, ?delay, "Job claim failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_stages(&self, request: &QuizJobRequest) -> Result<Quiz, JobError> {
        let job = &request.job;
        let content = self.aggregator.aggregate(&job.scope).await?;

        let questions = self
            .generator
            .generate(&content.text, request.question_count, request.difficulty)
            .await?;

        let quiz = Quiz {
            id: Uuid::new_v4(),
            job_id: job.id,
            course_id: job.scope.course_id,
            time_bucket: job.scope.time_bucket.clone(),
            requester_id: job.scope.requester_id,
            difficulty: request.difficulty,
            material_id: None,
            questions,
            generated_at: Utc::now(),
        };
        let result = JobResult {
            quiz_id: quiz.id,
            num_questions: quiz.questions.len(),
            material_count: content.document_count,
        };
        debug!(status = "completed", "Job status transition");
        self.store.complete_with_quiz(&quiz, &result).await?;

        Ok(quiz)
    }

    async fn record_failure(&self, job_id: Uuid, message: &str) {
        debug!(status = "failed", "Job status transition");
        if let Err(e) = self.store.fail(job_id, message).await {
            error!(error = %e, "Could not record job failure");
        }
    }
}

fn bounded_message(message: &str) -> String {
    message.chars().take(MAX_STORED_ERROR_CHARS).collect()
}

//=========================================================================================
// Worker Pool
//=========================================================================================

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<QuizJobRequest>>>;

/// A fixed set of workers sharing one job queue.
///
/// `dispatch` never blocks: jobs beyond the pool's capacity wait in the queue.
/// Constructed once at startup and shared by reference with submitters.
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<QuizJobRequest>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size` workers (at least one) on the current runtime.
    pub fn start(size: usize, pipeline: Arc<QuizPipeline>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let workers = (0..size.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue.clone(),
                    pipeline.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        info!(workers = size.max(1), "Quiz worker pool started");

        Self {
            sender,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Queues a job for execution and returns immediately.
    pub fn dispatch(&self, request: QuizJobRequest) -> Result<(), SubmissionError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmissionError::PoolClosed(request.job.id));
        }
        self.sender
            .send(request)
            .map_err(|rejected| SubmissionError::PoolClosed(rejected.0.job.id))
    }

    /// Stops accepting work, lets the workers drain the queue, and waits for them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        join_all(workers).await;
        info!("Quiz worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Queue,
    pipeline: Arc<QuizPipeline>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Quiz worker started");
    loop {
        let next = {
            let mut receiver = queue.lock().await;
            tokio::select! {
                biased;
                request = receiver.recv() => request,
                _ = shutdown.cancelled() => receiver.try_recv().ok(),
            }
        };
        let Some(request) = next else {
            break;
        };

        let job_id = request.job.id;
        let span = info_span!(
            "quiz_job",
            worker_id,
            job_id = %job_id,
            course_id = request.job.scope.course_id,
            time_bucket = %request.job.scope.time_bucket,
        );

        // A panicking job must not take the worker down with it.
        let task = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.process(request).await }.instrument(span.clone())
        });
        if let Err(e) = task.await {
            error!(parent: &span, error = %e, "Quiz job aborted unexpectedly");
            pipeline
                .record_failure(job_id, "Quiz generation aborted unexpectedly")
                .await;
        }
    }
    debug!(worker_id, "Quiz worker stopped");
}
