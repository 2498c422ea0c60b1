//! crates/coursemate_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz-generation pipeline.
//! These structs are independent of any database or transport; the only
//! serialization they carry is the wire shape of generated questions and the
//! job result payload, both of which are part of the domain contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Jobs
//=========================================================================================

/// The kind of asynchronous work a job performs.
///
/// Only quiz generation exists today; the enum stays open for future job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum JobType {
    QuizGeneration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::QuizGeneration => "quiz_generation",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz_generation" => Ok(JobType::QuizGeneration),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job. Transitions only move forward:
/// `Pending -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coarse period identifier for course material: a week token, any free-form
/// label, or the "all" sentinel meaning every period of the course.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    All,
    Period(String),
}

impl TimeBucket {
    pub const ALL_SENTINEL: &'static str = "all";

    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::ALL_SENTINEL) {
            TimeBucket::All
        } else {
            TimeBucket::Period(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeBucket::All => Self::ALL_SENTINEL,
            TimeBucket::Period(label) => label,
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job (or content query) is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobScope {
    pub course_id: i64,
    pub time_bucket: TimeBucket,
    /// The student the quiz is personalized for.
    pub requester_id: i64,
    /// Legacy single-material reference; quizzes synthesized from a whole
    /// time-bucket leave this empty.
    pub material_id: Option<i64>,
}

/// The admission dedup key: at most one non-terminal job may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub job_type: JobType,
    pub course_id: i64,
    pub time_bucket: TimeBucket,
    pub requester_id: i64,
}

/// Summary payload stored on a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub quiz_id: Uuid,
    pub num_questions: usize,
    pub material_count: usize,
}

/// A unit of asynchronous work.
///
/// `result` is present iff `status == Completed`, `error` iff `status == Failed`,
/// and `completed_at` iff the status is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub scope: JobScope,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh `pending` job with a new identity.
    pub fn new(job_type: JobType, scope: JobScope) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            scope,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            job_type: self.job_type,
            course_id: self.scope.course_id,
            time_bucket: self.scope.time_bucket.clone(),
            requester_id: self.scope.requester_id,
        }
    }
}

//=========================================================================================
// Quizzes
//=========================================================================================

/// Requested quiz difficulty. Unknown labels fall back to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validated quiz question.
///
/// The serialized form matches what the generation model is asked to emit, so a
/// stored quiz can be handed to the chat front-end unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Question {
    #[serde(rename = "mcq")]
    Mcq {
        question: String,
        choices: [String; 4],
        /// 0-based index into `choices`.
        answer: u8,
        explanation: String,
    },
    #[serde(rename = "short")]
    ShortAnswer {
        question: String,
        answer: String,
        explanation: String,
    },
}

impl Question {
    pub fn is_mcq(&self) -> bool {
        matches!(self, Question::Mcq { .. })
    }
}

/// The generated artifact. Created once when a job completes; immutable after.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub id: Uuid,
    pub job_id: Uuid,
    pub course_id: i64,
    pub time_bucket: TimeBucket,
    pub requester_id: i64,
    pub difficulty: Difficulty,
    /// Always `None` for quizzes synthesized from a whole time-bucket.
    pub material_id: Option<i64>,
    pub questions: Vec<Question>,
    pub generated_at: DateTime<Utc>,
}

//=========================================================================================
// Catalog and recipients (read-only views of collaborator data)
//=========================================================================================

/// A document bound to a course time-bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRef {
    pub id: i64,
    pub filename: String,
    /// Storage locator, relative to the storage root unless absolute.
    pub locator: String,
    pub uploader_id: i64,
}

/// Text formats with a dedicated extractor, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" | "doc" => Some(DocumentFormat::Docx),
            "pptx" | "ppt" => Some(DocumentFormat::Pptx),
            _ => None,
        }
    }
}

/// An addressable identity that can receive a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub actor_id: i64,
    /// Chat address (e.g. a Telegram chat id).
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_only_move_forward() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn time_bucket_recognizes_all_sentinel() {
        assert_eq!(TimeBucket::parse("ALL"), TimeBucket::All);
        assert_eq!(TimeBucket::parse(" 3 "), TimeBucket::Period("3".to_string()));
        assert_eq!(TimeBucket::All.as_str(), "all");
    }

    #[test]
    fn difficulty_falls_back_to_medium() {
        assert_eq!(Difficulty::parse_lenient("Hard"), Difficulty::Hard);
        assert_eq!(Difficulty::parse_lenient("impossible"), Difficulty::Medium);
    }

    #[test]
    fn document_format_by_extension() {
        assert_eq!(DocumentFormat::from_filename("w1.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_filename("notes.doc"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_filename("deck.pptx"), Some(DocumentFormat::Pptx));
        assert_eq!(DocumentFormat::from_filename("readme.txt"), None);
        assert_eq!(DocumentFormat::from_filename("noext"), None);
    }

    #[test]
    fn short_answer_serializes_with_short_tag() {
        let q = Question::ShortAnswer {
            question: "What is TCP?".to_string(),
            answer: "A transport protocol".to_string(),
            explanation: "It runs over IP.".to_string(),
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "short");
        assert_eq!(json["answer"], "A transport protocol");
    }
}
