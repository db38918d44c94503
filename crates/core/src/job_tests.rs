use super::*;

fn runner() -> RunnerSnapshot {
    RunnerSnapshot {
        runner_id: Some(RunnerId::new(3)),
        runner_name: "gpu-box".into(),
        runner_version: "1.0.0".into(),
        runner_git_hash: "abc123".into(),
        runner_source_url: "https://example.invalid/runner".into(),
    }
}

#[test]
fn new_queued_job_is_unfinished_with_audio_handle() {
    let job = Job::builder().build();
    assert_eq!(job.status(), JobStatus::Unfinished);
    assert!(!job.is_finished());
    assert!(job.audio_handle.is_some());
    job.check_invariants().expect("fresh job satisfies invariants");
}

#[test]
fn finish_succeeded_clears_audio_and_sets_downloaded_false() {
    let mut job = Job::builder().build();
    let now = Utc::now();
    job.finish_succeeded(runner(), now).unwrap();
    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(job.downloaded, Some(false));
    assert!(job.audio_handle.is_none());
    assert!(job.error_msg.is_none());
    job.check_invariants().unwrap();
}

#[test]
fn finish_failed_records_error_and_leaves_downloaded_null() {
    let mut job = Job::builder().build();
    job.finish_failed("boom", Some(runner()), Utc::now()).unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.downloaded, None);
    assert_eq!(job.error_msg.as_deref(), Some("boom"));
    job.check_invariants().unwrap();
}

#[test]
fn finishing_twice_is_rejected() {
    let mut job = Job::builder().build();
    job.finish_succeeded(runner(), Utc::now()).unwrap();
    let err = job.finish_succeeded(runner(), Utc::now()).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn mark_aborting_is_idempotent() {
    let mut job = Job::builder().build();
    job.mark_aborting();
    assert!(job.aborting);
    assert!(job.audio_handle.is_none());
    // second call is a no-op, not an error
    job.mark_aborting();
    assert!(job.aborting);
}

#[test]
fn mark_aborting_on_finished_job_is_a_no_op() {
    let mut job = Job::builder().build();
    job.finish_failed("boom", None, Utc::now()).unwrap();
    job.mark_aborting();
    assert!(!job.aborting, "finished jobs cannot become aborting");
}
