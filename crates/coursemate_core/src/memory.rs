//! crates/coursemate_core/src/memory.rs
//!
//! A process-local `JobStore`, used by tests and by runs without a database.
//! It upholds the same invariants as the PostgreSQL adapter: one non-terminal
//! job per dedup key, and forward-only status transitions.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{DedupKey, Job, JobResult, JobStatus, Quiz};
use crate::ports::{InsertOutcome, JobStore, PortError, PortResult};

#[derive(Default)]
struct StoreState {
    /// Insertion order doubles as creation order.
    jobs: Vec<Job>,
    quizzes: HashMap<Uuid, Quiz>,
}

impl StoreState {
    fn job_mut(&mut self, job_id: Uuid) -> PortResult<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| PortError::NotFound(format!("Job {} not found", job_id)))
    }

    fn transition(&mut self, job_id: Uuid, next: JobStatus) -> PortResult<&mut Job> {
        let job = self.job_mut(job_id)?;
        if !job.status.can_transition_to(next) {
            return Err(PortError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                job_id, job.status, next
            )));
        }
        job.status = next;
        if next.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        Ok(job)
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job in creation order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn quiz_count(&self) -> usize {
        self.state.lock().await.quizzes.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_if_absent(&self, job: &Job) -> PortResult<InsertOutcome> {
        let mut state = self.state.lock().await;
        let key = job.dedup_key();
        if let Some(existing) = state
            .jobs
            .iter()
            .find(|j| j.status.is_in_flight() && j.dedup_key() == key)
        {
            return Ok(InsertOutcome::AlreadyInFlight(existing.clone()));
        }
        if state.jobs.iter().any(|j| j.id == job.id) {
            return Err(PortError::Conflict(format!("Job {} already exists", job.id)));
        }
        state.jobs.push(job.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_job(&self, job_id: Uuid) -> PortResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn find_latest(&self, key: &DedupKey) -> PortResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .rev()
            .find(|j| &j.dedup_key() == key)
            .cloned())
    }

    async fn mark_running(&self, job_id: Uuid) -> PortResult<()> {
        self.state
            .lock()
            .await
            .transition(job_id, JobStatus::Running)?;
        Ok(())
    }

    async fn complete_with_quiz(&self, quiz: &Quiz, result: &JobResult) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if state.quizzes.contains_key(&quiz.id) {
            return Err(PortError::Conflict(format!("Quiz {} already exists", quiz.id)));
        }
        let job = state.transition(quiz.job_id, JobStatus::Completed)?;
        job.result = Some(result.clone());
        state.quizzes.insert(quiz.id, quiz.clone());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let job = state.transition(job_id, JobStatus::Failed)?;
        job.error = Some(error.to_string());
        Ok(())
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Option<Quiz>> {
        Ok(self.state.lock().await.quizzes.get(&quiz_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, JobScope, JobType, TimeBucket};

    fn scope(requester_id: i64) -> JobScope {
        JobScope {
            course_id: 7,
            time_bucket: TimeBucket::parse("2"),
            requester_id,
            material_id: None,
        }
    }

    #[tokio::test]
    async fn rejects_second_in_flight_job_for_same_key() {
        let store = InMemoryJobStore::new();
        let first = Job::new(JobType::QuizGeneration, scope(1));
        let second = Job::new(JobType::QuizGeneration, scope(1));
        let other = Job::new(JobType::QuizGeneration, scope(2));

        assert_eq!(store.insert_if_absent(&first).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_if_absent(&second).await.unwrap(),
            InsertOutcome::AlreadyInFlight(first.clone())
        );
        assert_eq!(store.insert_if_absent(&other).await.unwrap(), InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn transitions_are_forward_only() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobType::QuizGeneration, scope(1));
        store.insert_if_absent(&job).await.unwrap();

        assert!(matches!(
            store.fail(job.id, "too early").await,
            Err(PortError::Conflict(_))
        ));
        store.mark_running(job.id).await.unwrap();
        store.fail(job.id, "boom").await.unwrap();
        assert!(matches!(
            store.mark_running(job.id).await,
            Err(PortError::Conflict(_))
        ));

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(stored.result.is_none());
        assert!(stored.completed_at.is_some());
    }

    fn quiz_for(job: &Job) -> Quiz {
        Quiz {
            id: Uuid::new_v4(),
            job_id: job.id,
            course_id: job.scope.course_id,
            time_bucket: job.scope.time_bucket.clone(),
            requester_id: job.scope.requester_id,
            difficulty: Difficulty::Medium,
            material_id: None,
            questions: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    fn result_for(quiz: &Quiz) -> JobResult {
        JobResult {
            quiz_id: quiz.id,
            num_questions: 0,
            material_count: 1,
        }
    }

    #[tokio::test]
    async fn quiz_is_stored_only_when_job_completes() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobType::QuizGeneration, scope(1));
        store.insert_if_absent(&job).await.unwrap();
        let quiz = quiz_for(&job);

        // Still pending: the transition is rejected and nothing is written.
        assert!(matches!(
            store.complete_with_quiz(&quiz, &result_for(&quiz)).await,
            Err(PortError::Conflict(_))
        ));
        assert_eq!(store.quiz_count().await, 0);

        store.mark_running(job.id).await.unwrap();
        store.complete_with_quiz(&quiz, &result_for(&quiz)).await.unwrap();

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.result, Some(result_for(&quiz)));
        assert_eq!(store.get_quiz(quiz.id).await.unwrap(), Some(quiz));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        assert!(matches!(
            store.mark_running(Uuid::new_v4()).await,
            Err(PortError::NotFound(_))
        ));
        assert!(store.get_job(Uuid::new_v4()).await.unwrap().is_none());
    }
}
