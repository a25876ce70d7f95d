//! Connection pool limits as seen by submitted jobs

mod common;

use common::{fast_config, harness};
use orchestrator_core::application::SubmitRequest;
use orchestrator_core::domain::{CommandSpec, JobSpec, JobStatus};
use orchestrator_core::port::transport::mocks::MockTransport;
use orchestrator_core::port::AliasResolver;
use std::time::Duration;

fn uptime() -> SubmitRequest {
    SubmitRequest::new("web", JobSpec::Ssh(CommandSpec::new("uptime")))
}

#[tokio::test]
async fn test_saturated_pool_fails_job_with_pool_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config();
    config.pool.max_connections = 2;
    let h = harness(dir.path(), MockTransport::new(), config).await;

    let server = h.catalog.resolve("web").await.unwrap();
    let pool = h.orchestrator.pool();
    let first = pool.get_connection("web", &server).await.unwrap();
    let _second = pool.get_connection("web", &server).await.unwrap();

    let blocked = h.orchestrator.tasks().submit(uptime()).await.unwrap();
    assert_eq!(blocked.job.status, JobStatus::Failed);
    assert!(blocked
        .job
        .error
        .as_deref()
        .unwrap()
        .contains("waiting for a free connection"));

    drop(first);
    let freed = h.orchestrator.tasks().submit(uptime()).await.unwrap();
    assert_eq!(freed.job.status, JobStatus::Completed);
    assert_eq!(pool.stats().total_connections, 2);
}

#[tokio::test]
async fn test_concurrent_jobs_never_exceed_max_connections() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    transport.set_connect_delay_ms(30);
    let mut config = fast_config();
    config.pool.max_connections = 2;
    config.pool.acquire_timeout = Duration::from_secs(5);
    let h = harness(dir.path(), transport.clone(), config).await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.tasks().submit(uptime()).await })
        })
        .collect();
    for handle in handles {
        let submission = handle.await.unwrap().unwrap();
        assert_eq!(submission.job.status, JobStatus::Completed);
    }

    assert!(transport.connect_attempts() <= 2);
    let stats = h.orchestrator.pool().stats();
    assert!(stats.total_connections <= 2);
    assert_eq!(stats.by_alias["web"].in_use, 0);
}

#[tokio::test]
async fn test_reaping_keeps_min_connections() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config();
    config.pool.max_connections = 3;
    config.pool.min_connections = 1;
    config.pool.idle_timeout = Duration::from_millis(50);
    let h = harness(dir.path(), MockTransport::new(), config).await;

    let server = h.catalog.resolve("web").await.unwrap();
    let pool = h.orchestrator.pool();
    let leases = vec![
        pool.get_connection("web", &server).await.unwrap(),
        pool.get_connection("web", &server).await.unwrap(),
        pool.get_connection("web", &server).await.unwrap(),
    ];
    drop(leases);
    assert_eq!(pool.stats().total_connections, 3);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pool.reap_idle().await, 2);
    assert_eq!(pool.stats().total_connections, 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pool.reap_idle().await, 0);
}
