use super::*;
use crate::engine::finalize::UNEXPECTED_FINALIZE_ERROR;
use crate::workspace::JobWorkspace;

#[tokio::test]
async fn finalize_of_unknown_job_does_nothing() {
    let harness = create_test_engine(ProviderSet::new()).await;

    assert!(
        !harness
            .engine
            .finalize(JobId(42), Outcome::failed("boom"))
            .await
    );
}

#[tokio::test]
async fn finalize_without_a_handle_still_applies() {
    let provider = Arc::new(MockProvider::callback(JobKind::SheetGen));
    let harness = create_test_engine(providers_of(provider)).await;
    let id = harness
        .engine
        .submit(JobRequest::new(JobKind::SheetGen, vec!["song.mp3".into()]))
        .await
        .unwrap();
    harness.engine.registry.remove(id);

    assert!(
        harness
            .engine
            .finalize(id, Outcome::failed("transcription failed"))
            .await
    );
    let info = harness.engine.get_job(id).await.unwrap();
    assert_eq!(info.status, JobStatus::Failed);
    assert_eq!(info.error_message.as_deref(), Some("transcription failed"));
}

#[tokio::test]
async fn second_finalize_is_a_no_op() {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let harness = create_test_engine(providers_of(provider)).await;
    let id = harness
        .engine
        .submit(JobRequest::new(JobKind::MusicGen, vec!["ambient".into()]))
        .await
        .unwrap();

    let first = harness
        .engine
        .finalize(
            id,
            Outcome::Succeeded {
                download_url: harness.result_url(),
            },
        )
        .await;
    let second = harness.engine.finalize(id, Outcome::failed("late")).await;

    assert!(first);
    assert!(!second);
    let info = harness.engine.get_job(id).await.unwrap();
    assert_eq!(info.status, JobStatus::Completed);
    assert!(info.error_message.is_none());
}

#[tokio::test]
async fn panic_during_finalize_fails_the_job_and_cleans_up() {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let harness = build_harness(providers_of(provider), |config| config, true).await;
    let id = harness
        .engine
        .submit(JobRequest::new(JobKind::MusicGen, vec!["ambient".into()]))
        .await
        .unwrap();

    let applied = harness
        .engine
        .finalize(
            id,
            Outcome::Succeeded {
                download_url: harness.result_url(),
            },
        )
        .await;

    assert!(applied);
    assert_eq!(harness.artifacts.puts(), 1);
    let info = harness.engine.get_job(id).await.unwrap();
    assert_eq!(info.status, JobStatus::Failed);
    assert_eq!(info.error_message.as_deref(), Some(UNEXPECTED_FINALIZE_ERROR));

    let workspace = JobWorkspace::path_for(harness.engine.get_config().temp_dir(), id);
    assert!(!workspace.exists());
    assert_eq!(harness.engine.in_flight(), 0);

    // The claim was released, so a retry sees a terminal job rather than a held claim
    assert!(!harness.engine.finalize(id, Outcome::failed("again")).await);
}

#[tokio::test]
async fn finalize_after_cancel_keeps_cancelled() {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let harness = create_test_engine(providers_of(provider)).await;
    let id = harness
        .engine
        .submit(JobRequest::new(JobKind::MusicGen, vec!["ambient".into()]))
        .await
        .unwrap();
    harness.engine.cancel(id).await.unwrap();

    let applied = harness
        .engine
        .finalize(
            id,
            Outcome::Succeeded {
                download_url: harness.result_url(),
            },
        )
        .await;

    assert!(!applied);
    let info = harness.engine.get_job(id).await.unwrap();
    assert_eq!(info.status, JobStatus::Cancelled);
    assert!(info.completed_at.is_some());
}

#[tokio::test]
async fn terminal_events_carry_the_stored_url() {
    let provider = Arc::new(MockProvider::callback(JobKind::MusicGen));
    let harness = create_test_engine(providers_of(provider)).await;
    let id = harness
        .engine
        .submit(JobRequest::new(JobKind::MusicGen, vec!["ambient".into()]))
        .await
        .unwrap();
    let mut events = harness.engine.subscribe();

    harness
        .engine
        .finalize(
            id,
            Outcome::Succeeded {
                download_url: harness.result_url(),
            },
        )
        .await;

    let info = harness.engine.get_job(id).await.unwrap();
    match events.recv().await.unwrap() {
        Event::JobCompleted {
            id: event_id,
            result_url,
            ..
        } => {
            assert_eq!(event_id, id);
            assert_eq!(Some(result_url), info.result_url);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
