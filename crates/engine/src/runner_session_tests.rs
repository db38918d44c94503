use futures_util::StreamExt;
use transcriptord_core::TranscriptFormat;

use super::*;
use crate::test_support::{audio_stream, user, Harness};

async fn register_runner(harness: &Harness, priority: i64) -> RegisteredSession {
    let (credential, _identity) = harness.create_runner_credential().await;
    harness
        .sessions
        .register(
            &credential,
            RunnerDeclaration {
                name: "gpu-1".into(),
                version: "1.0".into(),
                git_hash: "deadbeef".into(),
                source_url: "https://example.invalid/runner".into(),
                priority,
            },
        )
        .await
        .expect("register")
}

// SPEC §8 seed scenario 1 + 2.
#[tokio::test]
async fn submit_then_register_assigns_the_queued_job() {
    let harness = Harness::new();
    let user_id = user(7);

    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 1024]))
        .await
        .expect("submit_job");

    assert!(harness.ephemeral.queue_contains_job(job_id).await.unwrap());
    assert!(harness
        .ephemeral
        .peek_highest_priority_unassigned_job()
        .await
        .unwrap()
        .is_some());

    let session = register_runner(&harness, 100).await;

    let runner = harness
        .ephemeral
        .get_online_runner(session.runner_id)
        .await
        .unwrap()
        .expect("runner online");
    assert_eq!(runner.assigned_job_id, Some(job_id));

    let in_process = harness
        .ephemeral
        .get_in_process_job(job_id)
        .await
        .unwrap()
        .expect("in process job");
    assert_eq!(in_process.progress, 0.0);
}

// SPEC §8 seed scenario 3.
#[tokio::test]
async fn heartbeat_updates_progress_and_publishes() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 1024]))
        .await
        .unwrap();
    let session = register_runner(&harness, 100).await;

    let mut events = harness.ephemeral.subscribe(user_id).await.unwrap();

    let outcome = harness
        .sessions
        .heartbeat(session.runner_id, &session.session_token, 33.5)
        .await
        .expect("heartbeat");
    assert!(outcome.job_assigned);
    assert!(!outcome.abort);

    let in_process = harness.ephemeral.get_in_process_job(job_id).await.unwrap().unwrap();
    assert_eq!(in_process.progress, 33.5);

    let event = events.next().await.expect("event published");
    assert_eq!(event.job_id, job_id);
}

// SPEC §8 seed scenario 4.
#[tokio::test]
async fn abort_then_heartbeat_signals_abort_then_finalises_as_failed() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 1024]))
        .await
        .unwrap();
    let session = register_runner(&harness, 100).await;
    let _ = harness
        .sessions
        .retrieve_job_audio(session.runner_id, &session.session_token)
        .await
        .expect("retrieve_job_audio");

    harness.jobs.abort_job(user_id, false, job_id).await.expect("abort");

    let outcome = harness
        .sessions
        .heartbeat(session.runner_id, &session.session_token, 0.0)
        .await
        .expect("heartbeat");
    assert!(outcome.abort);
    assert!(!outcome.job_assigned);

    harness
        .sessions
        .submit_result(
            session.runner_id,
            &session.session_token,
            JobOutcome::Failure {
                error_msg: "aborted".into(),
            },
        )
        .await
        .expect("submit_result");

    let job = harness.durable.get_job_by_id(job_id).await.unwrap().unwrap();
    assert!(job.is_finished());
    assert_eq!(job.error_msg.as_deref(), Some("aborted"));
    assert!(job.audio_handle.is_none());

    let runner = harness
        .ephemeral
        .get_online_runner(session.runner_id)
        .await
        .unwrap()
        .expect("runner back online");
    assert!(runner.assigned_job_id.is_none());
}

// SPEC §8 seed scenario 5.
#[tokio::test]
async fn runner_silence_past_timeout_drops_its_ephemeral_records() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 1024]))
        .await
        .unwrap();
    let session = register_runner(&harness, 100).await;
    assert!(harness
        .ephemeral
        .get_online_runner(session.runner_id)
        .await
        .unwrap()
        .is_some());

    harness
        .clock
        .advance(chrono::Duration::seconds(crate::test_support::HEARTBEAT_TIMEOUT.as_secs() as i64 + 1));

    assert!(harness
        .ephemeral
        .get_online_runner(session.runner_id)
        .await
        .unwrap()
        .is_none());
    assert!(harness.ephemeral.get_in_process_job(job_id).await.unwrap().is_none());

    // The job itself is still queued and unassigned (its runner is gone, but
    // recovery/next dispatch owns reassignment, not TTL expiry itself).
    assert!(harness.ephemeral.queue_contains_job(job_id).await.unwrap());
}

#[tokio::test]
async fn submit_job_rejects_non_audio_content_type() {
    let harness = Harness::new();
    let result = harness
        .jobs
        .submit_job(user(7), "notes.txt", "text/plain", None, audio_stream(vec![0u8; 8]))
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn mismatched_session_token_is_rejected_distinctly() {
    let harness = Harness::new();
    let session = register_runner(&harness, 10).await;
    let result = harness
        .sessions
        .heartbeat(session.runner_id, "not-the-real-token", 0.0)
        .await;
    assert!(matches!(result, Err(EngineError::SessionMismatch)));
}

#[tokio::test]
async fn get_transcript_marks_downloaded_exactly_once() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 1024]))
        .await
        .unwrap();
    let session = register_runner(&harness, 10).await;
    let _ = harness
        .sessions
        .retrieve_job_audio(session.runner_id, &session.session_token)
        .await
        .expect("retrieve_job_audio");
    harness
        .sessions
        .submit_result(
            session.runner_id,
            &session.session_token,
            JobOutcome::Success {
                transcript: transcriptord_core::Transcript::new(job_id, vec![]),
            },
        )
        .await
        .unwrap();

    let first = harness
        .jobs
        .get_transcript(user_id, job_id, TranscriptFormat::Text)
        .await;
    assert!(first.is_ok());

    let job = harness.durable.get_job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.downloaded, Some(true));
}
