//! End-to-end job execution with file-backed catalog and audit history

mod common;

use common::{fast_config, harness};
use orchestrator_core::application::SubmitRequest;
use orchestrator_core::domain::{
    CommandSpec, JobResult, JobSpec, JobStatus, SequenceSpec, SequenceStep, TransferDirection,
    TransferPair, TransferSpec,
};
use orchestrator_core::port::transport::mocks::{MockReply, MockTransport};
use orchestrator_core::port::AuditSink;

#[tokio::test]
async fn test_echo_completes_and_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), MockTransport::new(), fast_config()).await;

    let submission = h
        .orchestrator
        .tasks()
        .submit(SubmitRequest::new("web", JobSpec::Ssh(CommandSpec::new("echo hi"))))
        .await
        .unwrap();

    assert!(submission.completed);
    let job = submission.job;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.output.as_deref().unwrap().contains("hi"));
    assert!(job.duration_ms.unwrap() >= 0);
    assert!(job.completed_at.is_some());

    let history = h.history.recent(Some("web"), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].job_id, job.id);
    assert_eq!(history[0].command, "echo hi");
    assert_eq!(history[0].job_type, "ssh");
}

#[tokio::test]
async fn test_glob_upload_with_one_failure_is_partial() {
    let dir = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(local.path().join(name), name.as_bytes()).unwrap();
    }
    std::fs::write(local.path().join("skip.log"), b"ignored").unwrap();

    let transport = MockTransport::new();
    transport.fail_transfer_of("b.txt");
    let h = harness(dir.path(), transport.clone(), fast_config()).await;

    let spec = TransferSpec {
        direction: TransferDirection::Upload,
        files: vec![TransferPair {
            local: format!("{}/*.txt", local.path().display()),
            remote: "/srv/upload".to_string(),
        }],
    };
    let submission = h
        .orchestrator
        .tasks()
        .submit(SubmitRequest::new("web", JobSpec::Sftp(spec)))
        .await
        .unwrap();

    let job = submission.job;
    assert_eq!(job.status, JobStatus::Partial);
    assert!(job.output.as_deref().unwrap().contains("2/3"));
    match job.result {
        Some(JobResult::Transfer {
            succeeded,
            total,
            failed_files,
        }) => {
            assert_eq!((succeeded, total), (2, 3));
            assert_eq!(failed_files.len(), 1);
            assert!(failed_files[0].file.ends_with("b.txt"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(transport.remote_file("/srv/upload/a.txt").unwrap(), b"a.txt");
    assert!(transport.remote_file("/srv/upload/skip.log").is_none());
}

#[tokio::test]
async fn test_sequence_aborts_on_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    transport.reply("make build", MockReply::exit(2, "missing target"));
    let h = harness(dir.path(), transport.clone(), fast_config()).await;

    let spec = SequenceSpec {
        commands: vec![SequenceStep::new("make build"), SequenceStep::new("make install")],
        continue_on_error: false,
        timeout_secs: None,
    };
    let submission = h
        .orchestrator
        .tasks()
        .submit(SubmitRequest::new("web", JobSpec::SshSequence(spec)))
        .await
        .unwrap();

    let job = submission.job;
    assert_eq!(job.status, JobStatus::Failed);
    match job.result {
        Some(JobResult::Sequence { steps }) => {
            assert_eq!(steps.len(), 1);
            assert!(!steps[0].success);
            assert_eq!(steps[0].exit_code, Some(2));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(!transport.executed().iter().any(|c| c.contains("make install")));
    assert_eq!(h.orchestrator.pool().stats().by_alias["web"].in_use, 0);
}

#[tokio::test]
async fn test_unknown_alias_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), MockTransport::new(), fast_config()).await;

    let submission = h
        .orchestrator
        .tasks()
        .submit(SubmitRequest::new("staging", JobSpec::Ssh(CommandSpec::new("uptime"))))
        .await
        .unwrap();

    assert_eq!(submission.job.status, JobStatus::Failed);
    assert!(submission
        .job
        .error
        .as_deref()
        .unwrap()
        .contains("Unknown server alias 'staging'"));
}
