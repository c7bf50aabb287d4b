use super::*;
use crate::api::routes::event_name;
use crate::types::{Event, JobId};

#[tokio::test]
async fn health_reports_version_and_load() {
    let (app, _engine, _harness) = create_test_app(ProviderSet::new(), None).await;

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["in_flight"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (app, _engine, _harness) = create_test_app(ProviderSet::new(), None).await;

    let response = app
        .oneshot(empty_request("GET", "/openapi.json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"].get("/jobs").is_some());
    assert!(body["paths"].get("/callbacks/{kind}").is_some());
}

#[tokio::test]
async fn events_endpoint_streams_sse() {
    let (app, _engine, _harness) = create_test_app(ProviderSet::new(), None).await;

    let response = app.oneshot(empty_request("GET", "/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[test]
fn event_names_match_serialized_tags() {
    let events = [
        Event::JobCancelled { id: JobId(1) },
        Event::JobPolled {
            id: JobId(1),
            attempt: 2,
        },
        Event::Shutdown,
    ];
    for event in events {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event_name(&event));
    }
}
