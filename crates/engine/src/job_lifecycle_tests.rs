use super::*;
use crate::test_support::{audio_stream, user, Harness};

#[tokio::test]
async fn delete_jobs_refuses_unfinished() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 8]))
        .await
        .unwrap();

    let result = harness.jobs.delete_jobs(user_id, &[job_id]).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn abort_queued_unassigned_job_fails_it_immediately() {
    let harness = Harness::new();
    let user_id = user(7);
    let job_id = harness
        .jobs
        .submit_job(user_id, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 8]))
        .await
        .unwrap();

    harness.jobs.abort_job(user_id, false, job_id).await.unwrap();

    let job = harness.durable.get_job_by_id(job_id).await.unwrap().unwrap();
    assert!(job.is_finished());
    assert_eq!(job.error_msg.as_deref(), Some("Job was aborted"));
    assert!(!harness.ephemeral.queue_contains_job(job_id).await.unwrap());
}

#[tokio::test]
async fn abort_by_non_owner_is_forbidden() {
    let harness = Harness::new();
    let owner = user(7);
    let other = user(8);
    let job_id = harness
        .jobs
        .submit_job(owner, "clip.wav", "audio/wav", None, audio_stream(vec![0u8; 8]))
        .await
        .unwrap();

    let result = harness.jobs.abort_job(other, false, job_id).await;
    assert!(matches!(result, Err(EngineError::Forbidden(_))));
}
