//! End-to-end routing behaviour: failover, backoff, re-admission and pinning.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use replica_router::config::parse_config;
use replica_router::health::TcpProbe;
use replica_router::routing::{pinned_scope, NeverPinned, PinStore, ReplicaRouter, TaskPin};
use replica_router::ReplicaId;
use tokio::net::TcpListener;

mod common;
use common::ScriptedProbe;

const BACKOFF: Duration = Duration::from_secs(60);

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test]
async fn test_failed_replica_excluded_until_backoff_elapses() {
    let probe = ScriptedProbe::new();
    let router = ReplicaRouter::builder("default")
        .replicas(["r1", "r2"])
        .backoff(BACKOFF)
        .build(probe.clone(), NeverPinned)
        .unwrap();
    let t0 = Instant::now();

    probe.fail("r1");
    assert_eq!(router.route_read_at(&(), t0).await, "default");

    // r1 recovers immediately, but stays out until its backoff has passed.
    probe.heal("r1");
    assert_eq!(router.route_read_at(&(), t0 + secs(10)).await, "r2");
    for offset in 11..=60 {
        assert_ne!(router.route_read_at(&(), t0 + secs(offset)).await, "r1");
    }

    let mut seen = HashMap::new();
    for _ in 0..10 {
        *seen.entry(router.route_read_at(&(), t0 + secs(61)).await).or_insert(0) += 1;
    }
    assert_eq!(seen.get(&ReplicaId::new("r1")), Some(&5));
    assert_eq!(seen.get(&ReplicaId::new("r2")), Some(&5));
}

#[tokio::test]
async fn test_readmitted_replica_still_broken_is_disabled_again() {
    let probe = ScriptedProbe::new();
    let router = ReplicaRouter::builder("default")
        .replica("r1")
        .backoff(BACKOFF)
        .build(probe.clone(), NeverPinned)
        .unwrap();
    let t0 = Instant::now();

    probe.fail("r1");
    assert_eq!(router.route_read_at(&(), t0).await, "default");
    // Optimistic re-admission: r1 is drawn again, fails again, and backs off anew.
    assert_eq!(router.route_read_at(&(), t0 + secs(61)).await, "default");
    assert_eq!(
        router.monitor().next_refresh_deadline(),
        Some(t0 + secs(61) + BACKOFF)
    );
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn test_total_outage_degrades_to_primary() {
    let probe = ScriptedProbe::new();
    let router = ReplicaRouter::builder("default")
        .replicas(["r1", "r2", "r3"])
        .build(probe.clone(), NeverPinned)
        .unwrap();
    for id in ["r1", "r2", "r3"] {
        probe.fail(id);
    }

    let t0 = Instant::now();
    for i in 0..1_000 {
        assert_eq!(router.route_read_at(&(), t0 + Duration::from_millis(i)).await, "default");
    }
    // One probe per replica; afterwards the empty rotation short-circuits.
    assert_eq!(probe.calls(), 3);
    assert!(router.status().replicas.iter().all(|r| !r.available));
}

#[tokio::test]
async fn test_pinned_client_always_reads_primary() {
    let probe = ScriptedProbe::new();
    let pins = PinStore::new(secs(15));
    let router = ReplicaRouter::builder("default")
        .replicas(["r1", "r2"])
        .build(probe.clone(), pins.clone())
        .unwrap();
    let t0 = Instant::now();

    pins.pin("after-write");
    for i in 0..20 {
        assert_eq!(router.route_read_at("after-write", t0 + secs(i)).await, "default");
    }
    assert_eq!(probe.calls(), 0);

    // Replica health does not matter for a pinned client either.
    probe.fail("r1");
    probe.fail("r2");
    assert_eq!(router.route_read_at("after-write", t0).await, "default");

    assert_eq!(router.route_write(), "default");
    assert!(router.allow_migration(&"default".into()));
    assert!(!router.allow_migration(&"r2".into()));
}

#[tokio::test]
async fn test_task_scoped_pin() {
    let router = ReplicaRouter::builder("default")
        .replica("r1")
        .build(ScriptedProbe::new(), TaskPin)
        .unwrap();

    assert_eq!(router.route_read(&()).await, "r1");
    let pinned = pinned_scope(async { router.route_read(&()).await }).await;
    assert_eq!(pinned, "default");
    assert_eq!(router.route_read(&()).await, "r1");
}

#[tokio::test]
async fn test_zero_replicas_always_primary() {
    let probe = ScriptedProbe::new();
    let router = ReplicaRouter::builder("default")
        .build(probe.clone(), NeverPinned)
        .unwrap();

    for _ in 0..100 {
        assert_eq!(router.route_read(&()).await, "default");
    }
    assert_eq!(probe.calls(), 0);
    assert_eq!(router.refresh(), Vec::<ReplicaId>::new());
}

#[tokio::test]
async fn test_tcp_probe_routes_around_dead_replica() {
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_addr = live.local_addr().unwrap();
    tokio::spawn(async move {
        while live.accept().await.is_ok() {}
    });
    let dead_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let config = parse_config(&format!(
        r#"
        primary = "main"

        [[replicas]]
        name = "dead"
        address = "{dead_addr}"

        [[replicas]]
        name = "live"
        address = "{live_addr}"

        [health]
        probe_timeout_ms = 500
        "#
    ))
    .unwrap();

    let router = ReplicaRouter::from_config(&config, TcpProbe::from_config(&config.replicas), NeverPinned).unwrap();

    assert_eq!(router.route_read(&()).await, "main");
    for _ in 0..5 {
        assert_eq!(router.route_read(&()).await, "live");
    }

    let status = router.status();
    assert!(!status.replicas[0].available);
    assert!(status.replicas[1].available);
}
