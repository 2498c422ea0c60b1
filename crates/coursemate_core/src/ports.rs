//! crates/coursemate_core/src/ports.rs
//!
//! Defines the service contracts (traits) the quiz pipeline depends on.
//! These traits form the boundary of the hexagonal architecture: the pipeline
//! logic in this crate only ever talks to storage, the catalog, the generative
//! model, and message delivery through them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    DedupKey, DocumentFormat, Job, JobResult, JobScope, MaterialRef, Quiz, Recipient, TimeBucket,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A write was rejected because the row was not in the expected state.
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Job Store
//=========================================================================================

/// Outcome of an atomic insert keyed by the job's dedup key.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// Another non-terminal job already holds the dedup key.
    AlreadyInFlight(Job),
}

/// Persistent record of jobs and the quizzes they produce; the single source of
/// truth for job lifecycle.
///
/// Implementations must enforce forward-only transitions: `mark_running` only
/// succeeds from `pending`, `complete_with_quiz`/`fail` only from `running`. A
/// rejected transition is reported as `PortError::Conflict`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts `job` unless a non-terminal job with the same dedup key exists.
    async fn insert_if_absent(&self, job: &Job) -> PortResult<InsertOutcome>;

    async fn get_job(&self, job_id: Uuid) -> PortResult<Option<Job>>;

    /// Returns the most recently created job for `key`, whatever its status.
    async fn find_latest(&self, key: &DedupKey) -> PortResult<Option<Job>>;

    async fn mark_running(&self, job_id: Uuid) -> PortResult<()>;

    /// Stores `quiz` and moves its job to `completed` as one write. On error
    /// neither change is visible.
    async fn complete_with_quiz(&self, quiz: &Quiz, result: &JobResult) -> PortResult<()>;

    async fn fail(&self, job_id: Uuid, error: &str) -> PortResult<()>;

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Option<Quiz>>;
}

//=========================================================================================
// Content Sources
//=========================================================================================

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Lists the materials bound to a course time-bucket in upload order.
    /// `TimeBucket::All` lists every bucket of the course.
    async fn materials_in_scope(
        &self,
        course_id: i64,
        time_bucket: &TimeBucket,
    ) -> PortResult<Vec<MaterialRef>>;

    async fn course_name(&self, course_id: i64) -> PortResult<Option<String>>;
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Reads the raw bytes behind a material's storage locator.
    async fn read(&self, locator: &str) -> PortResult<Vec<u8>>;
}

/// Per-document extraction failure. Never fatal to a job.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts plain text from a document of the given format.
    ///
    /// Implementations must cap their output at `max_chars` characters and may
    /// stop reading the document once the cap is reached.
    async fn extract_text(
        &self,
        data: Vec<u8>,
        format: DocumentFormat,
        max_chars: usize,
    ) -> Result<String, ExtractionError>;
}

//=========================================================================================
// Generative Model
//=========================================================================================

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one system + user prompt pair to the remote model and returns its text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> PortResult<String>;
}

//=========================================================================================
// Notification
//=========================================================================================

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Verified students entitled to the scope's course, with a reachable address.
    async fn entitled_students(&self, scope: &JobScope) -> PortResult<Vec<Recipient>>;

    /// The actor owning the scope's material (its uploader), if reachable.
    async fn scope_owner(&self, scope: &JobScope) -> PortResult<Option<Recipient>>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &Recipient, text: &str) -> PortResult<()>;
}
