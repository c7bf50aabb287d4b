//! Shared helpers for genjob integration tests

use genjob::config::ProviderEndpoint;
use genjob::{Config, JobEngine, JobId, JobReport, JobStatus};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bytes every mocked provider result serves
pub const RESULT_BYTES: &[u8] = b"generated-result";

/// Base URL stored results are published under
pub const PUBLIC_BASE_URL: &str = "http://cdn.test/results";

/// Configuration rooted in a temp directory with fast polling and fetch retries
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.engine.temp_dir = root.join("temp");
    config.engine.shutdown_timeout = Duration::from_secs(2);
    config.persistence.database_path = root.join("genjob.db");
    config.persistence.artifact_dir = root.join("artifacts");
    config.persistence.public_base_url = Some(PUBLIC_BASE_URL.into());
    config.polling.max_attempts = 50;
    config.polling.interval = Duration::from_millis(20);
    config.fetch.max_attempts = 2;
    config.fetch.delay = Duration::from_millis(10);
    config
}

/// Point a kind's endpoint at a mock server
pub fn endpoint(server: &MockServer) -> ProviderEndpoint {
    let mut endpoint = ProviderEndpoint::new(server.uri());
    endpoint.api_key = Some("test-key".into());
    endpoint
}

/// Serve [`RESULT_BYTES`] at `/files/<name>` and return its URL
pub async fn serve_result(server: &MockServer, name: &str) -> String {
    let route = format!("/files/{name}");
    Mock::given(method("GET"))
        .and(path(route.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(RESULT_BYTES))
        .mount(server)
        .await;
    format!("{}{}", server.uri(), route)
}

/// Write input files under the artifact root so relative input references resolve
pub fn write_inputs(config: &Config, names: &[&str]) {
    let root = &config.persistence.artifact_dir;
    std::fs::create_dir_all(root).unwrap();
    for name in names {
        std::fs::write(root.join(name), name.as_bytes()).unwrap();
    }
}

/// Poll the engine until the job reaches `status`
pub async fn wait_for_status(engine: &JobEngine, id: JobId, status: JobStatus) -> JobReport {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let report = engine.get_status(id).await.unwrap();
        if report.status == status {
            return report;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {} waiting for {status}",
            report.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
