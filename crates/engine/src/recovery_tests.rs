use chrono::Utc;
use transcriptord_core::{AudioHandle, Job, JobId, UserId};

use super::*;
use crate::test_support::Harness;

fn unfinished_job(id: i64, user_id: UserId, aborting: bool) -> Job {
    let mut job = Job::new_queued(
        JobId::new(id),
        user_id,
        None,
        "clip.wav",
        AudioHandle(id),
        Utc::now(),
    );
    job.aborting = aborting;
    job
}

// SPEC §8 seed scenario 6.
#[tokio::test]
async fn recovery_fails_aborting_jobs_and_requeues_the_rest() {
    let harness = Harness::new();
    let user_id = UserId::new(7);

    harness.durable_memory.seed_job(unfinished_job(50, user_id, true));
    harness.durable_memory.seed_job(unfinished_job(51, user_id, false));

    let report = recover(&harness.durable, &harness.ephemeral, &harness.dispatcher)
        .await
        .expect("recover");
    assert_eq!(report.aborted, 1);
    assert_eq!(report.recovered, 1);

    let job_50 = harness.durable.get_job_by_id(JobId::new(50)).await.unwrap().unwrap();
    assert!(job_50.is_finished());
    assert_eq!(job_50.error_msg.as_deref(), Some("Job was aborted"));

    let job_51 = harness.durable.get_job_by_id(JobId::new(51)).await.unwrap().unwrap();
    assert!(!job_51.is_finished());
    assert!(harness.ephemeral.queue_contains_job(JobId::new(51)).await.unwrap());
}

// Recovery is a fixed point (SPEC §8 "running it twice produces the same
// ephemeral state as running it once").
#[tokio::test]
async fn recovery_twice_is_a_fixed_point() {
    let harness = Harness::new();
    let user_id = UserId::new(7);
    harness.durable_memory.seed_job(unfinished_job(51, user_id, false));

    recover(&harness.durable, &harness.ephemeral, &harness.dispatcher)
        .await
        .unwrap();
    let queue_len_after_first = harness.ephemeral.queue_len().await.unwrap();

    recover(&harness.durable, &harness.ephemeral, &harness.dispatcher)
        .await
        .unwrap();
    let queue_len_after_second = harness.ephemeral.queue_len().await.unwrap();

    assert_eq!(queue_len_after_first, queue_len_after_second);
}
