//! Integration tests for container placement and the workload driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use vnflab_common::VnfError;
use vnflab_vnf::testing::InMemoryManager;
use vnflab_vnf::{
    ContainerManager, ContainerRequest, MountSpec, RemoveOutcome, WorkloadOutcome,
    WorkloadSummary, WorkloadUnit, run_all,
};

fn request(name: &str, host: &str) -> ContainerRequest {
    ContainerRequest {
        name: name.to_string(),
        host: host.to_string(),
        attachment: format!("mem.{host}"),
        image: format!("video_{name}"),
        entry: format!("./{name}.py"),
        mounts: vec![MountSpec::read_write("/tmp/pcap", "/home/pcap/")],
    }
}

async fn units(manager: &InMemoryManager) -> Vec<WorkloadUnit> {
    let server = manager.create(request("streaming_server", "server")).await.unwrap();
    let client = manager.create(request("streaming_client", "client")).await.unwrap();
    vec![WorkloadUnit::entry(server), WorkloadUnit::entry(client)]
}

#[tokio::test(start_paused = true)]
async fn test_units_run_concurrently() {
    let manager = InMemoryManager::new()
        .with_script("streaming_server", 0, Duration::from_secs(1))
        .with_script("streaming_client", 0, Duration::from_secs(3));
    let units = units(&manager).await;
    let manager = Arc::new(manager);

    let clock = Instant::now();
    let runs = run_all(Arc::clone(&manager), units, None).await;
    let elapsed = clock.elapsed();

    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].container, "streaming_server");
    assert_eq!(runs[1].container, "streaming_client");
    assert!(WorkloadSummary::new(runs).all_succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_cancel_siblings() {
    let manager = InMemoryManager::new()
        .with_script("streaming_server", 0, Duration::from_secs(5))
        .with_script("streaming_client", 7, Duration::from_millis(10));
    let units = units(&manager).await;
    let manager = Arc::new(manager);

    let runs = run_all(Arc::clone(&manager), units, None).await;

    assert_eq!(runs[0].outcome, WorkloadOutcome::Succeeded);
    assert!(runs[0].elapsed >= Duration::from_secs(5));
    assert_eq!(runs[1].outcome, WorkloadOutcome::Failed(7));
    assert_eq!(manager.execs(), 2);

    let summary = WorkloadSummary::new(runs);
    assert_eq!(summary.failures().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unit_timeout_only_affects_that_unit() {
    let manager = InMemoryManager::new()
        .with_script("streaming_server", 0, Duration::from_secs(60))
        .with_script("streaming_client", 0, Duration::from_secs(1));
    let units = units(&manager).await;
    let manager = Arc::new(manager);

    let runs = run_all(manager, units, Some(Duration::from_secs(10))).await;

    assert_eq!(runs[0].outcome, WorkloadOutcome::TimedOut);
    assert_eq!(runs[1].outcome, WorkloadOutcome::Succeeded);
}

#[tokio::test]
async fn test_exec_on_removed_container_is_an_error_outcome() {
    let manager = InMemoryManager::new();
    let units = units(&manager).await;
    manager.remove(&units[1].container).await.unwrap();

    let runs = run_all(Arc::new(manager), units, None).await;

    assert_eq!(runs[0].outcome, WorkloadOutcome::Succeeded);
    assert!(matches!(runs[1].outcome, WorkloadOutcome::Error(_)));
}

#[tokio::test]
async fn test_empty_unit_list() {
    let runs = run_all(Arc::new(InMemoryManager::new()), Vec::new(), None).await;
    assert!(runs.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_double_remove_is_a_no_op() {
    let manager = InMemoryManager::new();
    let handle = manager.create(request("streaming_server", "server")).await.unwrap();

    assert_eq!(manager.remove(&handle).await.unwrap(), RemoveOutcome::Removed);
    assert_eq!(manager.remove(&handle).await.unwrap(), RemoveOutcome::AlreadyGone);
    assert_eq!(manager.removals(), 1);
    assert!(manager.live().is_empty());
}

#[tokio::test]
async fn test_create_errors() {
    let manager = InMemoryManager::new()
        .with_images(["video_streaming_server"])
        .with_hosts(["server"]);

    let err = manager
        .create(request("streaming_client", "server"))
        .await
        .unwrap_err();
    assert!(matches!(err, VnfError::ImageNotFound { .. }));

    let mut on_missing_host = request("streaming_server", "client");
    on_missing_host.image = "video_streaming_server".into();
    let err = manager.create(on_missing_host).await.unwrap_err();
    assert!(matches!(err, VnfError::HostNotFound { .. }));

    let mut conflicting = request("streaming_server", "server");
    conflicting
        .mounts
        .push(MountSpec::read_only("/tmp/other", "/home/pcap"));
    let err = manager.create(conflicting).await.unwrap_err();
    assert!(matches!(err, VnfError::MountConflict { .. }));

    manager.create(request("streaming_server", "server")).await.unwrap();
    let err = manager
        .create(request("streaming_server", "server"))
        .await
        .unwrap_err();
    assert!(matches!(err, VnfError::DuplicateIdentity { .. }));
}

#[tokio::test]
async fn test_failed_start_is_discarded() {
    let manager = InMemoryManager::new().with_failed_start("streaming_client");

    let server = manager.create(request("streaming_server", "server")).await.unwrap();
    let err = manager
        .create(request("streaming_client", "client"))
        .await
        .unwrap_err();

    assert!(matches!(err, VnfError::CommandFailed { .. }));
    assert_eq!(manager.live(), ["streaming_server"]);
    assert_eq!(manager.existing(), [server.runtime_name.clone()]);

    manager.remove(&server).await.unwrap();
    assert!(manager.existing().is_empty());
}
