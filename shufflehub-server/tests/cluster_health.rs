//! Shuffle servers reporting storage health to an in-process coordinator

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shufflehub_cluster::{ApplicationManager, ClusterManager, CoordinatorService};
use shufflehub_core::config::{ShuffleServerConfig, StorageType};
use shufflehub_core::models::{AssignmentRequest, ServerId, StatusCode, TagSet};
use shufflehub_server::{DiskUsage, ShuffleServer, UsageSampler};

/// Storage usage percentage per directory, adjustable mid-test
#[derive(Default)]
struct DialSampler {
    usage: Mutex<HashMap<PathBuf, u64>>,
}

impl DialSampler {
    fn set(&self, path: &str, percent: u64) {
        self.usage.lock().insert(PathBuf::from(path), percent);
    }
}

impl UsageSampler for DialSampler {
    fn sample(&self, path: &Path) -> shufflehub_server::Result<DiskUsage> {
        let percent = self.usage.lock().get(path).copied().unwrap_or(0);
        Ok(DiskUsage::new(percent, 100))
    }
}

fn coordinator() -> CoordinatorService {
    CoordinatorService::new(
        Arc::new(ClusterManager::new(Duration::from_secs(3))),
        Arc::new(ApplicationManager::new(Duration::from_secs(60))),
        9,
    )
}

fn server_config(port: u16, dir: &str) -> ShuffleServerConfig {
    ShuffleServerConfig {
        ip: Some("127.0.0.1".to_string()),
        port,
        heartbeat_interval_ms: 1000,
        storage_type: StorageType::LocalFile,
        storage_base_path: vec![dir.to_string()],
        health_check_enabled: true,
        health_check_interval_ms: 1000,
        health_storage_max_usage_percentage: 90.0,
        health_storage_recovery_usage_percentage: 80.0,
        health_min_storage_percentage: 80.0,
        ..ShuffleServerConfig::default()
    }
}

async fn start_server(
    coordinator: &CoordinatorService,
    sampler: &Arc<DialSampler>,
    port: u16,
    dir: &str,
) -> ShuffleServer {
    let mut server = ShuffleServer::with_sampler(
        &server_config(port, dir),
        Arc::new(coordinator.clone()),
        sampler.clone(),
    )
    .unwrap();
    server.start().await;
    server
}

fn request() -> AssignmentRequest {
    AssignmentRequest::new("1", 1, 0, 1, 1, TagSet::server_version())
}

#[tokio::test(start_paused = true)]
async fn test_two_healthy_servers_are_listed_and_assigned() {
    let coordinator = coordinator();
    let sampler = Arc::new(DialSampler::default());
    sampler.set("/data/a", 30);
    sampler.set("/data/b", 40);

    let mut a = start_server(&coordinator, &sampler, 20001, "/data/a").await;
    let mut b = start_server(&coordinator, &sampler, 20002, "/data/b").await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let list = coordinator.get_server_list(&TagSet::server_version());
    assert_eq!(list.count, 2);

    let wide = AssignmentRequest::new("1", 1, 0, 4, 1, TagSet::server_version());
    let resp = coordinator.get_shuffle_assignments(&wide);
    assert_eq!(resp.status, StatusCode::Success);
    let known = [ServerId::from("127.0.0.1-20001"), ServerId::from("127.0.0.1-20002")];
    assert_eq!(resp.partition_to_servers.len(), 4);
    for servers in resp.partition_to_servers.values() {
        assert!(servers.iter().all(|s| known.contains(s)));
    }

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_disk_removes_then_recovery_restores_server() {
    let coordinator = coordinator();
    let sampler = Arc::new(DialSampler::default());
    sampler.set("/data/a", 30);

    let mut server = start_server(&coordinator, &sampler, 20001, "/data/a").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(coordinator.get_server_list(&TagSet::server_version()).count, 1);
    assert_eq!(coordinator.get_shuffle_assignments(&request()).status, StatusCode::Success);

    // Crosses the max threshold: gone within one check plus one heartbeat
    sampler.set("/data/a", 95);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(coordinator.get_server_list(&TagSet::server_version()).count, 0);
    let resp = coordinator.get_shuffle_assignments(&request());
    assert_eq!(resp.status, StatusCode::InternalError);
    assert!(resp.partition_to_servers.is_empty());

    // Inside the hysteresis band the server stays out
    sampler.set("/data/a", 85);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(coordinator.get_server_list(&TagSet::server_version()).count, 0);

    sampler.set("/data/a", 50);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(coordinator.get_server_list(&TagSet::server_version()).count, 1);
    assert_eq!(coordinator.get_shuffle_assignments(&request()).status, StatusCode::Success);

    server.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_expires_and_reregisters() {
    let coordinator = coordinator();
    let sweep = coordinator.cluster().start();
    let sampler = Arc::new(DialSampler::default());

    let mut server = start_server(&coordinator, &sampler, 20001, "/data/a").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(coordinator.cluster().node_count(), 1);

    server.shutdown().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(coordinator.cluster().node_count(), 0);
    assert_eq!(coordinator.get_shuffle_assignments(&request()).status, StatusCode::InternalError);

    let mut again = start_server(&coordinator, &sampler, 20001, "/data/a").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(coordinator.get_server_list(&TagSet::server_version()).count, 1);

    again.shutdown().await;
    coordinator.cluster().shutdown();
    sweep.await.unwrap();
}
