//! services/api/src/adapters/db.rs
//!
//! This module contains the PostgreSQL adapter. One struct implements three
//! ports from the `core` crate over the same pool: the `JobStore` (jobs and
//! quizzes), the `CatalogService` (courses and materials), and the
//! `RecipientDirectory` (students and professors).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursemate_core::domain::{
    DedupKey, Difficulty, Job, JobResult, JobScope, JobStatus, MaterialRef, Question, Quiz,
    Recipient, TimeBucket,
};
use coursemate_core::ports::{
    CatalogService, InsertOutcome, JobStore, PortError, PortResult, RecipientDirectory,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::instrument;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence and lookup ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Moves a job from `from` to `to`, failing with `Conflict` when the job is
    /// not currently in `from`.
    async fn transition(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> PortResult<()> {
        let updated = update_status(&self.pool, job_id, from, to, None, error)
            .await
            .map_err(unexpected)?;
        if updated == 1 {
            return Ok(());
        }
        Err(self.rejected_transition(job_id, to).await)
    }

    /// Explains why a guarded `UPDATE` matched no row.
    async fn rejected_transition(&self, job_id: Uuid, to: JobStatus) -> PortError {
        match self.get_job(job_id).await {
            Ok(Some(job)) => PortError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                job_id, job.status, to
            )),
            Ok(None) => PortError::NotFound(format!("Job {} not found", job_id)),
            Err(e) => e,
        }
    }

    async fn in_flight_for(&self, key: &DedupKey) -> PortResult<Option<Job>> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE job_type = $1 AND course_id = $2 AND time_bucket = $3 AND requester_id = $4
               AND status IN ('pending', 'running')
             LIMIT 1"
        ))
        .bind(key.job_type.as_str())
        .bind(key.course_id)
        .bind(key.time_bucket.as_str())
        .bind(key.requester_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(JobRecord::to_domain).transpose()
    }
}

/// Guarded status update; returns the number of rows moved (0 or 1).
async fn update_status<'e, E>(
    executor: E,
    job_id: Uuid,
    from: JobStatus,
    to: JobStatus,
    result: Option<&JobResult>,
    error: Option<&str>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let updated = sqlx::query(
        "UPDATE jobs
         SET status = $1,
             result = COALESCE($2, result),
             error_message = COALESCE($3, error_message),
             completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END
         WHERE id = $5 AND status = $6",
    )
    .bind(to.as_str())
    .bind(result.map(Json))
    .bind(error)
    .bind(to.is_terminal())
    .bind(job_id)
    .bind(from.as_str())
    .execute(executor)
    .await?;
    Ok(updated.rows_affected())
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const JOB_COLUMNS: &str = "id, job_type, status, course_id, time_bucket, requester_id, \
                           material_id, result, error_message, created_at, completed_at";

#[derive(FromRow)]
struct JobRecord {
    id: Uuid,
    job_type: String,
    status: String,
    course_id: i64,
    time_bucket: String,
    requester_id: i64,
    material_id: Option<i64>,
    result: Option<Json<JobResult>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}
impl JobRecord {
    fn to_domain(self) -> PortResult<Job> {
        Ok(Job {
            id: self.id,
            job_type: self.job_type.parse().map_err(PortError::Unexpected)?,
            status: self.status.parse().map_err(PortError::Unexpected)?,
            scope: JobScope {
                course_id: self.course_id,
                time_bucket: TimeBucket::parse(&self.time_bucket),
                requester_id: self.requester_id,
                material_id: self.material_id,
            },
            result: self.result.map(|Json(result)| result),
            error: self.error_message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct QuizRecord {
    id: Uuid,
    job_id: Uuid,
    course_id: i64,
    time_bucket: String,
    requester_id: i64,
    difficulty: String,
    material_id: Option<i64>,
    questions: Json<Vec<Question>>,
    generated_at: DateTime<Utc>,
}
impl QuizRecord {
    fn to_domain(self) -> Quiz {
        Quiz {
            id: self.id,
            job_id: self.job_id,
            course_id: self.course_id,
            time_bucket: TimeBucket::parse(&self.time_bucket),
            requester_id: self.requester_id,
            difficulty: Difficulty::parse_lenient(&self.difficulty),
            material_id: self.material_id,
            questions: self.questions.0,
            generated_at: self.generated_at,
        }
    }
}

#[derive(FromRow)]
struct MaterialRecord {
    id: i64,
    filename: String,
    filepath: String,
    uploader_id: i64,
}
impl MaterialRecord {
    fn to_domain(self) -> MaterialRef {
        MaterialRef {
            id: self.id,
            filename: self.filename,
            locator: self.filepath,
            uploader_id: self.uploader_id,
        }
    }
}

#[derive(FromRow)]
struct RecipientRecord {
    id: i64,
    telegram_id: String,
}
impl RecipientRecord {
    fn to_domain(self) -> Recipient {
        Recipient {
            actor_id: self.id,
            address: self.telegram_id,
        }
    }
}

//=========================================================================================
// `JobStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl JobStore for DbAdapter {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert_if_absent(&self, job: &Job) -> PortResult<InsertOutcome> {
        let inserted = sqlx::query(
            "INSERT INTO jobs (id, job_type, status, course_id, time_bucket, requester_id, material_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (job_type, course_id, time_bucket, requester_id)
                 WHERE status IN ('pending', 'running')
             DO NOTHING",
        )
        .bind(job.id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.scope.course_id)
        .bind(job.scope.time_bucket.as_str())
        .bind(job.scope.requester_id)
        .bind(job.scope.material_id)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if inserted.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        // The conflicting row may have reached a terminal state in between.
        match self.in_flight_for(&job.dedup_key()).await? {
            Some(existing) => Ok(InsertOutcome::AlreadyInFlight(existing)),
            None => Err(PortError::Conflict(format!(
                "Job {} collided with an in-flight job that has since finished",
                job.id
            ))),
        }
    }

    async fn get_job(&self, job_id: Uuid) -> PortResult<Option<Job>> {
        let record =
            sqlx::query_as::<_, JobRecord>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        record.map(JobRecord::to_domain).transpose()
    }

    async fn find_latest(&self, key: &DedupKey) -> PortResult<Option<Job>> {
        // A non-terminal row always wins over a newer terminal one.
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE job_type = $1 AND course_id = $2 AND time_bucket = $3 AND requester_id = $4
             ORDER BY (status IN ('pending', 'running')) DESC, created_at DESC
             LIMIT 1"
        ))
        .bind(key.job_type.as_str())
        .bind(key.course_id)
        .bind(key.time_bucket.as_str())
        .bind(key.requester_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(JobRecord::to_domain).transpose()
    }

    async fn mark_running(&self, job_id: Uuid) -> PortResult<()> {
        self.transition(job_id, JobStatus::Pending, JobStatus::Running, None)
            .await
    }

    #[instrument(skip(self, quiz, result), fields(quiz_id = %quiz.id, job_id = %quiz.job_id))]
    async fn complete_with_quiz(&self, quiz: &Quiz, result: &JobResult) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let updated = update_status(
            &mut *tx,
            quiz.job_id,
            JobStatus::Running,
            JobStatus::Completed,
            Some(result),
            None,
        )
        .await
        .map_err(unexpected)?;
        if updated != 1 {
            tx.rollback().await.map_err(unexpected)?;
            return Err(self.rejected_transition(quiz.job_id, JobStatus::Completed).await);
        }

        sqlx::query(
            "INSERT INTO quizzes (id, job_id, course_id, time_bucket, requester_id, difficulty, material_id, questions, generated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(quiz.id)
        .bind(quiz.job_id)
        .bind(quiz.course_id)
        .bind(quiz.time_bucket.as_str())
        .bind(quiz.requester_id)
        .bind(quiz.difficulty.as_str())
        .bind(quiz.material_id)
        .bind(Json(&quiz.questions))
        .bind(quiz.generated_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> PortResult<()> {
        self.transition(job_id, JobStatus::Running, JobStatus::Failed, Some(error))
            .await
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Option<Quiz>> {
        let record = sqlx::query_as::<_, QuizRecord>(
            "SELECT id, job_id, course_id, time_bucket, requester_id, difficulty, material_id, questions, generated_at
             FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(QuizRecord::to_domain))
    }
}

//=========================================================================================
// `CatalogService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogService for DbAdapter {
    #[instrument(skip(self), fields(time_bucket = %time_bucket))]
    async fn materials_in_scope(
        &self,
        course_id: i64,
        time_bucket: &TimeBucket,
    ) -> PortResult<Vec<MaterialRef>> {
        let query = match time_bucket {
            TimeBucket::All => sqlx::query_as::<_, MaterialRecord>(
                "SELECT id, filename, filepath, uploader_id FROM materials
                 WHERE course_id = $1
                 ORDER BY uploaded_at DESC, id DESC",
            )
            .bind(course_id),
            TimeBucket::Period(week) => sqlx::query_as::<_, MaterialRecord>(
                "SELECT id, filename, filepath, uploader_id FROM materials
                 WHERE course_id = $1 AND week = $2
                 ORDER BY uploaded_at DESC, id DESC",
            )
            .bind(course_id)
            .bind(week.as_str()),
        };

        let records = query.fetch_all(&self.pool).await.map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn course_name(&self, course_id: i64) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT name FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)
    }
}

//=========================================================================================
// `RecipientDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecipientDirectory for DbAdapter {
    /// Verified students of the course's university, major and year that have a
    /// chat address.
    async fn entitled_students(&self, scope: &JobScope) -> PortResult<Vec<Recipient>> {
        let records = sqlx::query_as::<_, RecipientRecord>(
            "SELECT s.id, s.telegram_id FROM students s
             JOIN courses c
               ON s.university_id = c.university_id
              AND s.major_id = c.major_id
              AND s.year = c.year
             WHERE c.id = $1 AND s.verified AND s.telegram_id IS NOT NULL
             ORDER BY s.id",
        )
        .bind(scope.course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    /// An uploader of the scope's materials, falling back to the course's
    /// active professor.
    async fn scope_owner(&self, scope: &JobScope) -> PortResult<Option<Recipient>> {
        let week = match &scope.time_bucket {
            TimeBucket::All => None,
            TimeBucket::Period(week) => Some(week.as_str()),
        };
        let record = sqlx::query_as::<_, RecipientRecord>(
            "SELECT p.id, p.telegram_id FROM professors p
             WHERE p.telegram_id IS NOT NULL
               AND (p.id IN (SELECT m.uploader_id FROM materials m
                             WHERE m.course_id = $1 AND ($2::TEXT IS NULL OR m.week = $2))
                    OR (p.course_id = $1 AND p.active))
             ORDER BY (p.id IN (SELECT m.uploader_id FROM materials m
                                WHERE m.course_id = $1 AND ($2::TEXT IS NULL OR m.week = $2))) DESC,
                      p.id
             LIMIT 1",
        )
        .bind(scope.course_id)
        .bind(week)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(RecipientRecord::to_domain))
    }
}
