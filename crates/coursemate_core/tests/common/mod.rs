#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coursemate_core::{
    AdmissionController, AggregatorLimits, CatalogService, CompletionService, ContentAggregator,
    DedupKey, DocumentFormat, DocumentStorage, ExtractionError, GenerationSettings,
    InMemoryJobStore, InsertOutcome, Job, JobResult, JobScope, JobStatus, JobStore, MaterialRef,
    MessageSender, Notifier, PortError, PortResult, Quiz, QuizGenerator, QuizJobService,
    QuizPipeline, Recipient, RecipientDirectory, TextExtractor, TimeBucket, WorkerPool,
};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

pub const COURSE_ID: i64 = 42;

//=========================================================================================
// Catalog + storage + extraction
//=========================================================================================

/// Serves materials whose "bytes" are the UTF-8 text itself.
#[derive(Default)]
pub struct MockCatalog {
    materials: HashMap<(i64, String), Vec<MaterialRef>>,
    contents: HashMap<String, String>,
}

impl MockCatalog {
    pub fn with_material(mut self, week: &str, filename: &str, text: &str) -> Self {
        let entry = self
            .materials
            .entry((COURSE_ID, week.to_string()))
            .or_default();
        let id = entry.len() as i64 + 1;
        let locator = format!("{}/{}", week, filename);
        entry.push(MaterialRef {
            id,
            filename: filename.to_string(),
            locator: locator.clone(),
            uploader_id: 900,
        });
        self.contents.insert(locator, text.to_string());
        self
    }
}

#[async_trait]
impl CatalogService for MockCatalog {
    async fn materials_in_scope(
        &self,
        course_id: i64,
        time_bucket: &TimeBucket,
    ) -> PortResult<Vec<MaterialRef>> {
        let found = match time_bucket {
            TimeBucket::All => {
                let mut keys: Vec<_> = self
                    .materials
                    .keys()
                    .filter(|(c, _)| *c == course_id)
                    .cloned()
                    .collect();
                keys.sort();
                keys.iter()
                    .flat_map(|k| self.materials[k].clone())
                    .collect()
            }
            TimeBucket::Period(week) => self
                .materials
                .get(&(course_id, week.clone()))
                .cloned()
                .unwrap_or_default(),
        };
        Ok(found)
    }

    async fn course_name(&self, course_id: i64) -> PortResult<Option<String>> {
        Ok(Some(format!("Networks {}", course_id)))
    }
}

#[async_trait]
impl DocumentStorage for MockCatalog {
    async fn read(&self, locator: &str) -> PortResult<Vec<u8>> {
        self.contents
            .get(locator)
            .map(|t| t.as_bytes().to_vec())
            .ok_or_else(|| PortError::NotFound(locator.to_string()))
    }
}

/// Treats every supported document as UTF-8 text; `FAIL` as content simulates a
/// corrupt file.
pub struct Utf8Extractor;

#[async_trait]
impl TextExtractor for Utf8Extractor {
    async fn extract_text(
        &self,
        data: Vec<u8>,
        _format: DocumentFormat,
        max_chars: usize,
    ) -> Result<String, ExtractionError> {
        let text = String::from_utf8(data).map_err(|e| ExtractionError::Failed(e.to_string()))?;
        if text == "FAIL" {
            return Err(ExtractionError::Failed("corrupt document".to_string()));
        }
        Ok(text.chars().take(max_chars).collect())
    }
}

//=========================================================================================
// Generative model
//=========================================================================================

/// Replays scripted responses in order, then answers with a fixed fallback.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<PortResult<String>>>,
    fallback: String,
    calls: Mutex<Vec<Instant>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<PortResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: "not json at all".to_string(),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn always(content: &str) -> Self {
        let mut completion = Self::new(Vec::new());
        completion.fallback = content.to_string();
        completion
    }

    /// Blocks every call until the returned semaphore receives a permit.
    pub fn gated(content: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut completion = Self::always(content);
        completion.gate = Some(gate.clone());
        (completion, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> PortResult<String> {
        self.calls.lock().unwrap().push(Instant::now());
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub fn mcq_batch(count: usize) -> String {
    let items: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "type": "mcq",
                "question": format!("Question {}?", i),
                "choices": ["a", "b", "c", "d"],
                "answer": i % 4,
                "explanation": "Because."
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

pub fn remote_error() -> PortResult<String> {
    Err(PortError::Unexpected("connection reset".to_string()))
}

//=========================================================================================
// Notification
//=========================================================================================

pub struct MockDirectory {
    pub students: Vec<Recipient>,
    pub owner: Option<Recipient>,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self {
            students: vec![
                Recipient { actor_id: 1, address: "111".to_string() },
                Recipient { actor_id: 2, address: "222".to_string() },
            ],
            owner: Some(Recipient { actor_id: 900, address: "999".to_string() }),
        }
    }
}

#[async_trait]
impl RecipientDirectory for MockDirectory {
    async fn entitled_students(&self, _scope: &JobScope) -> PortResult<Vec<Recipient>> {
        Ok(self.students.clone())
    }

    async fn scope_owner(&self, _scope: &JobScope) -> PortResult<Option<Recipient>> {
        Ok(self.owner.clone())
    }
}

/// Records delivered messages; addresses in `failing` always error.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failing: Vec<String>,
}

impl RecordingSender {
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: &Recipient, text: &str) -> PortResult<()> {
        if self.failing.contains(&recipient.address) {
            return Err(PortError::Unexpected("chat not found".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.address.clone(), text.to_string()));
        Ok(())
    }
}

//=========================================================================================
// Job store with injected outages
//=========================================================================================

/// Number of upcoming calls, per operation, that fail with a store outage.
#[derive(Default)]
pub struct StoreFaults {
    pub mark_running: AtomicUsize,
    pub complete: AtomicUsize,
}

impl StoreFaults {
    fn trip(counter: &AtomicUsize) -> PortResult<()> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(PortError::Unexpected("connection to database lost".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Delegates to an `InMemoryJobStore`, failing calls as `StoreFaults` dictates.
pub struct FaultyStore {
    inner: Arc<InMemoryJobStore>,
    faults: Arc<StoreFaults>,
}

#[async_trait]
impl JobStore for FaultyStore {
    async fn insert_if_absent(&self, job: &Job) -> PortResult<InsertOutcome> {
        self.inner.insert_if_absent(job).await
    }

    async fn get_job(&self, job_id: Uuid) -> PortResult<Option<Job>> {
        self.inner.get_job(job_id).await
    }

    async fn find_latest(&self, key: &DedupKey) -> PortResult<Option<Job>> {
        self.inner.find_latest(key).await
    }

    async fn mark_running(&self, job_id: Uuid) -> PortResult<()> {
        StoreFaults::trip(&self.faults.mark_running)?;
        self.inner.mark_running(job_id).await
    }

    async fn complete_with_quiz(&self, quiz: &Quiz, result: &JobResult) -> PortResult<()> {
        StoreFaults::trip(&self.faults.complete)?;
        self.inner.complete_with_quiz(quiz, result).await
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> PortResult<()> {
        self.inner.fail(job_id, error).await
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> PortResult<Option<Quiz>> {
        self.inner.get_quiz(quiz_id).await
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub faults: Arc<StoreFaults>,
    pub completion: Arc<ScriptedCompletion>,
    pub sender: Arc<RecordingSender>,
    pub pool: Arc<WorkerPool>,
    pub service: QuizJobService,
}

pub fn fast_settings() -> GenerationSettings {
    GenerationSettings {
        base_delay: Duration::from_millis(1),
        ..GenerationSettings::default()
    }
}

pub fn harness(
    catalog: MockCatalog,
    completion: ScriptedCompletion,
    directory: MockDirectory,
    sender: RecordingSender,
) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let faults = Arc::new(StoreFaults::default());
    let faulty: Arc<dyn JobStore> = Arc::new(FaultyStore {
        inner: store.clone(),
        faults: faults.clone(),
    });
    let catalog = Arc::new(catalog);
    let completion = Arc::new(completion);
    let sender = Arc::new(sender);

    let aggregator = ContentAggregator::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(Utf8Extractor),
        AggregatorLimits::default(),
    );
    let generator = QuizGenerator::new(completion.clone(), fast_settings());
    let notifier = Notifier::new(Arc::new(directory), catalog, sender.clone());
    let pipeline = Arc::new(QuizPipeline::new(faulty.clone(), aggregator, generator, notifier));
    let pool = Arc::new(WorkerPool::start(3, pipeline));
    let admission = AdmissionController::new(faulty.clone(), pool.clone(), 5);
    let service = QuizJobService::new(admission, faulty);

    Harness {
        store,
        faults,
        completion,
        sender,
        pool,
        service,
    }
}

/// Polls until the job reaches a terminal status.
pub async fn wait_terminal(store: &InMemoryJobStore, job_id: Uuid) -> JobStatus {
    for _ in 0..500 {
        if let Some(job) = store.get_job(job_id).await.unwrap() {
            if job.status.is_terminal() {
                return job.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal status", job_id);
}

pub fn sample_text(chars: usize) -> String {
    let sentence = "Packets are forwarded hop by hop across routers. ";
    sentence.chars().cycle().take(chars).collect()
}
