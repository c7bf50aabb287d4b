use super::*;
use serde_json::json;

async fn app_with_music_job() -> (Router, Arc<JobEngine>, TestHarness, crate::types::JobId) {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let (app, engine, harness) = create_test_app(providers_of(provider), None).await;
    let id = engine
        .submit(crate::types::JobRequest::new(
            JobKind::MusicGen,
            vec!["sea shanty".into()],
        ))
        .await
        .unwrap();
    (app, engine, harness, id)
}

#[tokio::test]
async fn completed_callback_is_acknowledged_and_finalized() {
    let (app, engine, harness, id) = app_with_music_job().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/callbacks/music_gen",
            json!({"task_id": "task-1", "status": "COMPLETED", "url": harness.result_url()}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"], "finalized");
    assert_eq!(body["job_id"], id.0);
    assert_eq!(
        engine.get_status(id).await.unwrap().status,
        JobStatus::Completed
    );

    let response = app
        .oneshot(json_request(
            "POST",
            "/callbacks/music_gen",
            json!({"task_id": "task-1", "status": "COMPLETED", "url": harness.result_url()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["result"], "duplicate");
}

#[tokio::test]
async fn unknown_external_id_is_404() {
    let (app, _engine, _harness, _id) = app_with_music_job().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/callbacks/music_gen",
            json!({"task_id": "nope", "status": "COMPLETED"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_payload_is_400() {
    let (app, _engine, _harness, _id) = app_with_music_job().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/callbacks/music_gen",
            json!({"status": "COMPLETED"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_callback");
}

#[tokio::test]
async fn unknown_kind_is_404() {
    let (app, _engine, _harness, _id) = app_with_music_job().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/callbacks/karaoke",
            json!({"task_id": "task-1", "status": "COMPLETED"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
