//! Shared test helpers for creating JobEngine instances in tests.

use crate::artifacts::{ArtifactStore, InputArtifact, LocalArtifactStore};
use crate::config::{Config, ProviderEndpoint};
use crate::db::Database;
use crate::engine::JobEngine;
use crate::error::{ProviderError, Result};
use crate::provider::{
    CallbackPayload, CompletionProtocol, PollStatus, Provider, ProviderSet, RemoteStatus,
    SubmitRequest,
};
use crate::types::{Event, JobId, JobInfo, JobKind, JobStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bytes served by the result server for every successful download
pub(crate) const RESULT_BYTES: &[u8] = b"generated-result-bytes";

/// Scriptable in-memory provider
///
/// Submissions return `task-1`, `task-2`, ... unless a rejection is configured. Poll
/// answers are taken from the script in order; an empty script answers PROCESSING.
/// Callback bodies look like `{"task_id": "...", "status": "...", "url": "...", "error": "..."}`.
pub(crate) struct MockProvider {
    kind: JobKind,
    protocol: CompletionProtocol,
    reject: Option<ProviderError>,
    script: Mutex<VecDeque<std::result::Result<PollStatus, ProviderError>>>,
    submits: AtomicUsize,
    polls: AtomicUsize,
    gate: Option<Arc<tokio::sync::Semaphore>>,
}

impl MockProvider {
    pub(crate) fn polling(kind: JobKind) -> Self {
        Self {
            kind,
            protocol: CompletionProtocol::Poll,
            reject: None,
            script: Mutex::new(VecDeque::new()),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub(crate) fn callback(kind: JobKind) -> Self {
        Self {
            protocol: CompletionProtocol::Callback,
            ..Self::polling(kind)
        }
    }

    pub(crate) fn rejecting(mut self, error: ProviderError) -> Self {
        self.reject = Some(error);
        self
    }

    /// Hold every submission until `gate` hands out a permit
    pub(crate) fn gated(mut self, gate: Arc<tokio::sync::Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn with_script(
        self,
        answers: Vec<std::result::Result<PollStatus, ProviderError>>,
    ) -> Self {
        *self.script.lock().unwrap() = answers.into();
        self
    }

    pub(crate) fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn protocol(&self) -> CompletionProtocol {
        self.protocol
    }

    async fn submit(&self, _request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        match &self.reject {
            Some(error) => Err(error.clone()),
            None => Ok(format!("task-{n}")),
        }
    }

    async fn poll_status(
        &self,
        _external_task_id: &str,
    ) -> std::result::Result<PollStatus, ProviderError> {
        if self.protocol != CompletionProtocol::Poll {
            return Err(ProviderError::NotPollable { kind: self.kind });
        }
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PollStatus::Processing))
    }

    fn parse_callback(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<CallbackPayload, ProviderError> {
        if self.protocol != CompletionProtocol::Callback {
            return Err(ProviderError::NotCallbackBased { kind: self.kind });
        }
        let field = |name: &str| body.get(name).and_then(|v| v.as_str()).map(String::from);
        let external_task_id = field("task_id").ok_or_else(|| ProviderError::InvalidCallback {
            message: "missing task_id".into(),
        })?;
        let status = field("status")
            .as_deref()
            .and_then(RemoteStatus::parse)
            .ok_or_else(|| ProviderError::InvalidCallback {
                message: "missing or unknown status".into(),
            })?;
        Ok(CallbackPayload {
            external_task_id,
            status,
            result_urls: field("url").into_iter().collect(),
            error: field("error"),
        })
    }
}

/// Local artifact store that counts writes and can be told to panic in `put`
pub(crate) struct CountingArtifacts {
    inner: LocalArtifactStore,
    panic_on_put: bool,
    puts: AtomicUsize,
    removes: AtomicUsize,
}

impl CountingArtifacts {
    pub(crate) async fn new(root: &Path) -> Self {
        Self {
            inner: LocalArtifactStore::new(root, None).await.unwrap(),
            panic_on_put: false,
            puts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panic_on_put = true;
        self
    }

    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for CountingArtifacts {
    async fn put(&self, job_id: JobId, kind: JobKind, staged: &Path) -> Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_put {
            panic!("artifact store exploded");
        }
        self.inner.put(job_id, kind, staged).await
    }

    fn url(&self, reference: &str) -> String {
        self.inner.url(reference)
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(reference).await
    }

    async fn read_input(&self, reference: &str) -> Result<InputArtifact> {
        self.inner.read_input(reference).await
    }
}

/// Everything a test needs to drive an engine
pub(crate) struct TestHarness {
    pub(crate) engine: JobEngine,
    pub(crate) db: Arc<Database>,
    pub(crate) artifacts: Arc<CountingArtifacts>,
    pub(crate) server: MockServer,
    pub(crate) temp_dir: TempDir,
}

impl TestHarness {
    /// URL of a downloadable result
    pub(crate) fn result_url(&self) -> String {
        format!("{}/results/output.bin", self.server.uri())
    }

    /// URL that always answers 404
    pub(crate) fn missing_url(&self) -> String {
        format!("{}/results/missing.bin", self.server.uri())
    }

    /// Build a second engine over the same database and directories
    pub(crate) async fn reopen(&self, providers: ProviderSet) -> JobEngine {
        let config = test_config(self.temp_dir.path());
        JobEngine::new(config, self.db.clone(), self.artifacts.clone(), providers)
            .await
            .unwrap()
    }
}

/// Configuration with short timings rooted in `root`
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.engine.temp_dir = root.join("temp");
    config.engine.max_concurrent_jobs = 4;
    config.engine.shutdown_timeout = Duration::from_secs(2);
    config.persistence.database_path = root.join("test.db");
    config.persistence.artifact_dir = root.join("artifacts");
    config.polling.max_attempts = 5;
    config.polling.interval = Duration::from_millis(10);
    config.fetch.max_attempts = 2;
    config.fetch.delay = Duration::from_millis(10);
    config.fetch.request_timeout = Duration::from_secs(5);
    config
}

/// Mock server serving [`RESULT_BYTES`] under `/results/output.bin`
pub(crate) async fn result_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results/output.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(RESULT_BYTES))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/results/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

/// Helper to create a test engine over the given providers
pub(crate) async fn create_test_engine(providers: ProviderSet) -> TestHarness {
    build_harness(providers, |config| config, false).await
}

/// Like [`create_test_engine`] with a config tweak and optionally a panicking store
pub(crate) async fn build_harness(
    providers: ProviderSet,
    tweak: impl FnOnce(Config) -> Config,
    panic_on_put: bool,
) -> TestHarness {
    let temp_dir = tempdir().unwrap();
    let config = tweak(test_config(temp_dir.path()));

    let db = Arc::new(Database::new(&config.persistence.database_path).await.unwrap());
    let mut artifacts = CountingArtifacts::new(&config.persistence.artifact_dir).await;
    if panic_on_put {
        artifacts = artifacts.panicking();
    }
    let artifacts = Arc::new(artifacts);
    let server = result_server().await;

    let engine = JobEngine::new(config, db.clone(), artifacts.clone(), providers)
        .await
        .unwrap();

    TestHarness {
        engine,
        db,
        artifacts,
        server,
        temp_dir,
    }
}

/// Provider set with a single provider
pub(crate) fn providers_of(provider: Arc<MockProvider>) -> ProviderSet {
    ProviderSet::new().with(provider)
}

/// Endpoint on an address nothing listens on
pub(crate) fn unreachable_endpoint() -> ProviderEndpoint {
    ProviderEndpoint::new("http://127.0.0.1:9")
}

/// Wait until the stored job reaches `status`, failing the test after a few seconds
pub(crate) async fn wait_for_status(engine: &JobEngine, id: JobId, status: JobStatus) -> JobInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let info = engine.get_job(id).await.unwrap();
        if info.status == status {
            return info;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {id} stuck in {} waiting for {status}", info.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the engine tracks no jobs, failing the test after a few seconds
pub(crate) async fn wait_until_idle(engine: &JobEngine) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.in_flight() > 0 {
        if tokio::time::Instant::now() > deadline {
            panic!("{} jobs still in flight", engine.in_flight());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event currently buffered in a receiver
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
