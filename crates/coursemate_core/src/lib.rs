pub mod admission;
pub mod aggregator;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generation;
pub mod memory;
pub mod notifier;
pub mod ports;
pub mod service;

pub use admission::{Admission, AdmissionController, AdmissionKind, QuizRequest};
pub use aggregator::{AggregatedContent, AggregatorLimits, ContentAggregator};
pub use domain::{
    DedupKey, Difficulty, DocumentFormat, Job, JobResult, JobScope, JobStatus, JobType,
    MaterialRef, Question, Quiz, Recipient, TimeBucket,
};
pub use engine::{QuizJobRequest, QuizPipeline, WorkerPool};
pub use error::{AggregationError, GenerationError, JobError, JobQueryError, SubmissionError};
pub use generation::{GenerationSettings, QuizGenerator};
pub use memory::InMemoryJobStore;
pub use notifier::Notifier;
pub use ports::{
    CatalogService, CompletionService, DocumentStorage, ExtractionError, InsertOutcome, JobStore,
    MessageSender, PortError, PortResult, RecipientDirectory, TextExtractor,
};
pub use service::{JobStatusView, QuizJobService};
