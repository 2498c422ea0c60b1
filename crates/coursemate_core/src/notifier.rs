//! crates/coursemate_core/src/notifier.rs
//!
//! Best-effort fan-out of job outcomes. Nothing in here can fail a job: every
//! error is logged and swallowed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Difficulty, Job, Quiz};
use crate::ports::{CatalogService, MessageSender, RecipientDirectory};

/// Characters of the failure reason included in an owner notice.
const FAILURE_EXCERPT_CHARS: usize = 200;

pub struct Notifier {
    directory: Arc<dyn RecipientDirectory>,
    catalog: Arc<dyn CatalogService>,
    sender: Arc<dyn MessageSender>,
}

impl Notifier {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        catalog: Arc<dyn CatalogService>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            directory,
            catalog,
            sender,
        }
    }

    /// Tells every entitled student that a quiz is ready for the job's scope.
    pub async fn notify_completed(&self, job: &Job, quiz: &Quiz) {
        let recipients = match self.directory.entitled_students(&job.scope).await {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not resolve quiz recipients");
                return;
            }
        };
        if recipients.is_empty() {
            return;
        }

        let course = self.course_label(job.scope.course_id).await;
        let message = completion_message(&course, job, quiz.difficulty, quiz.questions.len());

        let mut delivered = 0;
        for recipient in &recipients {
            match self.sender.send(recipient, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    job_id = %job.id,
                    actor_id = recipient.actor_id,
                    error = %e,
                    "Failed to notify student"
                ),
            }
        }
        info!(
            job_id = %job.id,
            delivered,
            total = recipients.len(),
            "Notified students about new quiz"
        );
    }

    /// Tells the scope owner that generation failed. A missing or unreachable
    /// owner is a silent no-op.
    pub async fn notify_failed(&self, job: &Job, error: &str) {
        let owner = match self.directory.scope_owner(&job.scope).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not resolve scope owner");
                return;
            }
        };

        let course = self.course_label(job.scope.course_id).await;
        let message = failure_message(&course, job, error);
        if let Err(e) = self.sender.send(&owner, &message).await {
            warn!(
                job_id = %job.id,
                actor_id = owner.actor_id,
                error = %e,
                "Failed to notify owner about quiz failure"
            );
        }
    }

    async fn course_label(&self, course_id: i64) -> String {
        match self.catalog.course_name(course_id).await {
            Ok(Some(name)) => name,
            _ => format!("Course #{}", course_id),
        }
    }
}

fn completion_message(course: &str, job: &Job, difficulty: Difficulty, questions: usize) -> String {
    format!(
        "New quiz available!\n\n\
         Course: {}\n\
         Week: {}\n\
         Difficulty: {}\n\
         Questions: {}\n\n\
         Use /start to take the quiz.",
        course, job.scope.time_bucket, difficulty, questions
    )
}

fn failure_message(course: &str, job: &Job, error: &str) -> String {
    let excerpt: String = error.chars().take(FAILURE_EXCERPT_CHARS).collect();
    format!(
        "Quiz generation failed\n\n\
         Course: {}\n\
         Week: {}\n\n\
         Error: {}\n\n\
         Please re-upload the material or contact support.",
        course, job.scope.time_bucket, excerpt
    )
}
