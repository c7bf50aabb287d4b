use super::*;
use crate::engine::test_helpers::{MockProvider, TestHarness, build_harness, providers_of};
use crate::provider::ProviderSet;
use crate::types::{JobKind, JobStatus};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;

mod callbacks;
mod system;

/// Harness whose engine is wrapped in Arc, with the router built from its config
async fn create_test_app(
    providers: ProviderSet,
    api_key: Option<&str>,
) -> (Router, Arc<JobEngine>, TestHarness) {
    let api_key = api_key.map(String::from);
    let harness = build_harness(
        providers,
        |mut config| {
            config.api.api_key = api_key;
            config
        },
        false,
    )
    .await;
    let engine = Arc::new(harness.engine.clone());
    let app = create_router(engine.clone(), engine.get_config());
    (app, engine, harness)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn api_server_spawns() {
    let (_app, engine, _harness) = create_test_app(ProviderSet::new(), None).await;

    let mut config = (*engine.get_config()).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move { start_api_server(engine, config).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn cors_headers_are_added() {
    let (app, _engine, _harness) = create_test_app(ProviderSet::new(), None).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn api_key_guards_job_routes_but_not_callbacks() {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let (app, engine, _harness) =
        create_test_app(providers_of(provider), Some("s3cret")).await;
    let id = engine
        .submit(crate::types::JobRequest::new(
            JobKind::MusicGen,
            vec!["rainy day".into()],
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/jobs/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut authorized = empty_request("GET", &format!("/jobs/{}", id));
    authorized
        .headers_mut()
        .insert("x-api-key", "s3cret".parse().unwrap());
    let response = app.clone().oneshot(authorized).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request(
            "POST",
            "/callbacks/music_gen",
            serde_json::json!({"task_id": "task-1", "status": "FAILED", "error": "model overloaded"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = engine.get_status(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
}
