//! crates/coursemate_core/src/error.rs
//!
//! Error taxonomy of the quiz-generation pipeline.

use uuid::Uuid;

use crate::ports::PortError;

/// Failures of the content aggregation stage.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("No materials found for course {course_id}, time bucket {time_bucket}")]
    NoContent { course_id: i64, time_bucket: String },

    #[error("Could not extract sufficient text from materials ({chars} characters, need {min})")]
    InsufficientContent { chars: usize, min: usize },

    #[error("Catalog lookup failed: {0}")]
    Port(#[from] PortError),
}

/// Failures of the generation stage.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation call failed: {0}")]
    Remote(PortError),

    #[error("Could not parse generated questions: {0}")]
    Parse(String),

    #[error("No valid questions generated ({dropped} dropped by validation)")]
    Validation { dropped: usize },

    #[error("Failed to generate quiz after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<GenerationError>,
    },
}

/// Everything that can terminate a job as `failed`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Job store error: {0}")]
    Store(#[from] PortError),
}

/// Failures of the submission facade.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Job store error: {0}")]
    Store(#[from] PortError),

    #[error("Worker pool is shut down; job {0} could not be dispatched")]
    PoolClosed(Uuid),
}

/// Failures of status and quiz lookups.
#[derive(Debug, thiserror::Error)]
pub enum JobQueryError {
    #[error("Not found: {0}")]
    NotFound(Uuid),

    #[error("Job store error: {0}")]
    Store(#[from] PortError),
}
