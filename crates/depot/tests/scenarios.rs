//! End-to-end scenarios driven through the public [`Depot`] facade
//! against a `tempfile`-backed single-volume pool.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use depot::{Depot, DepotError, ItemStatus, TenantId};
use depot_config::{DepotConfig, RetrySettings, VolumeEntry};

fn config_with_one_volume(dir: &std::path::Path) -> DepotConfig {
    let mut config = DepotConfig::default();
    config.metadata_root = dir.join("meta");
    config.quota_root = dir.join("quota");
    config.auto_create_tenants = true;
    config.volumes.push(VolumeEntry {
        id: "v1".to_string(),
        mount_path: dir.join("v1"),
        sharding_depth: 1,
        total_capacity: 10_000_000,
    });
    config
}

/// Scenario 1: write -> claim -> complete.
#[test]
fn write_claim_complete() {
    let dir = tempfile::tempdir().unwrap();
    let depot = Depot::open(config_with_one_volume(dir.path())).unwrap();
    let tenant = TenantId::new("t1");

    let item_id = depot.write_file(&tenant, b"hello", Some("x.txt")).unwrap();

    let location = depot.claim_next(&tenant).unwrap().unwrap();
    assert_eq!(location.item_id, item_id);
    assert_eq!(location.volume_id.as_str(), "v1");
    assert_eq!(location.size_bytes, 5);

    let physical_path = depot
        .get_info(&tenant, &item_id)
        .unwrap()
        .unwrap()
        .physical_path;

    depot.mark_completed(&tenant, &item_id).unwrap();

    assert!(depot.get_info(&tenant, &item_id).unwrap().is_none());
    assert!(!std::path::Path::new(&physical_path).exists());
}

/// Scenario 2: 100 pre-written items, 10 concurrent workers draining the
/// queue; every item is completed exactly once.
#[test]
fn concurrent_drain_completes_every_item_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let depot = Arc::new(Depot::open(config_with_one_volume(dir.path())).unwrap());
    let tenant = TenantId::new("t1");

    for i in 0..100 {
        depot
            .write_file(&tenant, format!("item-{i}").as_bytes(), None)
            .unwrap();
    }

    let completed = Arc::new(std::sync::Mutex::new(Vec::new()));
    thread::scope(|scope| {
        for _ in 0..10 {
            let depot = depot.clone();
            let tenant = tenant.clone();
            let completed = completed.clone();
            scope.spawn(move || loop {
                match depot.claim_next(&tenant).unwrap() {
                    Some(location) => {
                        depot.mark_completed(&tenant, &location.item_id).unwrap();
                        completed.lock().unwrap().push(location.item_id);
                    }
                    None => break,
                }
            });
        }
    });

    let completed = completed.lock().unwrap();
    assert_eq!(completed.len(), 100);
    let unique: std::collections::HashSet<_> = completed.iter().collect();
    assert_eq!(unique.len(), 100);
}

/// Scenario 3: retry path with exponential backoff reaching
/// `permanently-failed` at `max_retries`.
#[test]
fn retry_path_reaches_permanently_failed_at_max_retries() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_one_volume(dir.path());
    config.retry = RetrySettings {
        max: 3,
        initial_delay_ms: 40,
        exponential: true,
        max_delay_ms: 10_000,
    };
    let depot = Depot::open(config).unwrap();
    let tenant = TenantId::new("t1");

    let item_id = depot.write_file(&tenant, b"payload", None).unwrap();

    let location = depot.claim_next(&tenant).unwrap().unwrap();
    depot.mark_failed(&tenant, &location.item_id, "e1").unwrap();

    assert!(depot.claim_next(&tenant).unwrap().is_none());

    thread::sleep(Duration::from_millis(60));
    let location = depot.claim_next(&tenant).unwrap().unwrap();
    depot.mark_failed(&tenant, &location.item_id, "e2").unwrap();

    thread::sleep(Duration::from_millis(120));
    let location = depot.claim_next(&tenant).unwrap().unwrap();
    depot.mark_failed(&tenant, &location.item_id, "e3").unwrap();

    assert_eq!(
        depot.status(&tenant, &item_id).unwrap(),
        ItemStatus::PermanentlyFailed
    );
    assert_eq!(depot.claim_next(&tenant).unwrap(), None);
}

/// Scenario 4: a claimed item whose consumer disappears is reclaimed by
/// the reconciler's timeout pass, with its retry count untouched.
#[test]
fn processing_timeout_is_reclaimed_by_reconciler() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_one_volume(dir.path());
    config.processing_timeout_secs = 0;
    config.compaction_enabled = false;
    let depot = Depot::open(config).unwrap();
    let tenant = TenantId::new("t1");

    let item_id = depot.write_file(&tenant, b"payload", None).unwrap();
    depot.claim_next(&tenant).unwrap().unwrap();
    assert_eq!(
        depot.status(&tenant, &item_id).unwrap(),
        ItemStatus::Processing
    );

    thread::sleep(Duration::from_millis(5));
    depot.run_reconciler_tick().unwrap();

    let location = depot.claim_next(&tenant).unwrap().unwrap();
    assert_eq!(location.item_id, item_id);
    assert_eq!(location.retry_count, 0);
}

/// Scenario 5: corruption recovery produces a forensic backup and rebuilds
/// every item as a fresh pending record pointing at surviving bytes.
#[test]
fn corruption_recovery_rebuilds_from_physical_scan() {
    let dir = tempfile::tempdir().unwrap();
    let depot = Depot::open(config_with_one_volume(dir.path())).unwrap();
    let tenant = TenantId::new("t1");

    for payload in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
        depot.write_file(&tenant, payload, None).unwrap();
    }

    let record_count = depot.rebuild_tenant(&tenant).unwrap();
    assert_eq!(record_count, 3);

    for _ in 0..3 {
        let location = depot.claim_next(&tenant).unwrap().unwrap();
        assert_eq!(location.status, ItemStatus::Processing);
        assert_eq!(location.retry_count, 0);
        assert!(std::path::Path::new(&location.physical_path).exists());
    }
    assert!(depot.claim_next(&tenant).unwrap().is_none());
}

/// Scenario 6: once a tenant's item-count quota is exhausted, a further
/// write is rejected and leaves no physical file or metadata record
/// behind — it never reaches the volume write step.
#[test]
fn write_past_tenant_quota_is_rejected_and_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_one_volume(dir.path());
    config.tenants.push(depot_config::TenantSeed {
        tenant_id: "t1".to_string(),
        storage_path: "/mnt/v1/t1".to_string(),
        quota: Some(1),
    });
    let depot = Depot::open(config).unwrap();
    let tenant = TenantId::new("t1");

    let first = depot.write_file(&tenant, b"first", None).unwrap();

    let err = depot.write_file(&tenant, b"second", None);
    assert!(matches!(
        err,
        Err(DepotError::TenantQuotaExceeded { current: 1, max: 1 })
    ));

    // The accepted first item is untouched; no second item exists anywhere.
    assert!(depot.get_info(&tenant, &first).unwrap().is_some());
    let v1_dir = dir.path().join("v1");
    let file_count = walk_file_count(&v1_dir);
    assert_eq!(file_count, 1);
}

fn walk_file_count(dir: &std::path::Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                count += walk_file_count(&path);
            } else {
                count += 1;
            }
        }
    }
    count
}
