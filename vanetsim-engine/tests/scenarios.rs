//! End-to-end scenarios exercising the full tick pipeline

use approx::assert_relative_eq;
use nalgebra::{Point2, Vector2};
use std::collections::BTreeSet;
use vanetsim_cluster::{
    ClusterManager, ClusteringEngine, ElectionEngine, ElectionMode,
};
use vanetsim_core::cluster::{Cluster, ClusterState};
use vanetsim_core::config::{
    ClusteringConfig, ElectionConfig, ProtocolConfig, SimulationConfig, TrustConfig,
};
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::{SubScores, Vehicle, VehicleId, VehicleSnapshot};
use vanetsim_engine::source::{KinematicsSource, ScriptedSource, ScriptedVehicle};
use vanetsim_engine::Simulation;
use vanetsim_trust::TrustEventKind;

fn vehicle_at(id: VehicleId, x: f64, y: f64, trust: f64) -> Vehicle {
    let snapshot = VehicleSnapshot {
        id,
        position: Point2::new(x, y),
        speed: 20.0,
        heading: 0.0,
        lane: 0,
        is_emergency: false,
        timestamp: 0.0,
    };
    Vehicle::from_snapshot(&snapshot, 100.0, 2.0, trust)
}

/// Transparent election: pinned metrics for vehicle 75, majority win.
#[test]
fn scenario_transparent_election() {
    let config = SimulationConfig::standard();
    let engine = ElectionEngine::from_config(&config);
    let mut store = VehicleStore::new(300.0);

    // Vehicle 75: T = 0.5*0.992 + 0.5*1.0 = 0.996, R = 0.836 from
    // (150 Mbps, 3.016 GHz), S = 0 (never head, no member within radius),
    // B = 1.0, C = 1 - 186.3/300 = 0.379.
    let mut v75 = vehicle_at(75, 0.0, 0.0, 1.0);
    v75.bandwidth_mbps = 150.0;
    v75.processing_ghz = 3.016;
    v75.sub_scores = SubScores::uniform(1.0);
    v75.cooperation_requests = 5;
    v75.cooperation_successes = 5;
    for i in 0..10 {
        v75.history.push(i as f64, 0.992);
    }
    store.upsert(v75);

    // Nine co-members: four cancelling pairs past the radius plus one far
    // outlier dragging the centroid to (186.3, 0). All hold trust 1.0 so
    // v75's social trust is exactly 1.0, but weak resources and zero
    // cooperation keep their composites strictly below v75's.
    let others = [
        (80, 310.0, 0.0),
        (81, -310.0, 0.0),
        (82, 0.0, 310.0),
        (83, 0.0, -310.0),
        (84, 320.0, 0.0),
        (85, -320.0, 0.0),
        (86, 0.0, 320.0),
        (87, 0.0, -320.0),
        (88, 1863.0, 0.0),
    ];
    for (id, x, y) in others {
        let mut v = vehicle_at(id, x, y, 1.0);
        v.bandwidth_mbps = 50.0;
        v.processing_ghz = 1.0;
        store.upsert(v);
    }

    let members: BTreeSet<VehicleId> =
        [75u64, 80, 81, 82, 83, 84, 85, 86, 87, 88].into_iter().collect();
    let mut cluster = Cluster::new(1, members, 0.0);

    let record = engine.run(&mut cluster, &mut store, 10.0, 100).unwrap();

    assert_eq!(record.winner_id, 75);
    assert_eq!(record.mode, ElectionMode::Majority);
    assert!(record.vote_share >= 0.51);

    let score = record
        .candidates
        .iter()
        .find(|c| c.id == 75)
        .expect("v75 scored");
    assert_relative_eq!(score.trust_metric, 0.996, epsilon = 1e-3);
    assert_relative_eq!(score.resource, 0.836, epsilon = 1e-3);
    assert_relative_eq!(score.stability, 0.0, epsilon = 1e-9);
    assert_relative_eq!(score.behavior, 1.0, epsilon = 1e-9);
    assert_relative_eq!(score.centrality, 0.379, epsilon = 1e-3);

    let expected =
        0.40 * 0.996 + 0.20 * 0.836 + 0.15 * 0.0 + 0.15 * 1.0 + 0.10 * 0.379;
    assert_relative_eq!(score.composite, expected, epsilon = 1e-4);
}

/// Sleeper activation and detection: flagged within 2 s of turning.
#[test]
fn scenario_sleeper_activation_and_detection() {
    let mut config = SimulationConfig::with_seed(1234);
    config.adversary.sleeper_ids = vec![5];
    config.adversary.sleeper_activation_min_s = 29.7;
    config.adversary.sleeper_activation_max_s = 29.7;

    let mut sim = Simulation::new(config).unwrap();
    let mut traffic = ScriptedSource::convoy(150, 30.0, 20.0);

    let mut activated_at = None;
    let mut flagged_at = None;

    for tick in 0..600u64 {
        let sim_time = tick as f64 * 0.1;
        let snapshots = traffic.next_tick(tick, sim_time, 0.1);
        sim.tick(&snapshots).unwrap();

        let v5 = sim.store().get(5).unwrap();
        if activated_at.is_none() && v5.adversary.is_active_malicious() {
            activated_at = Some(sim_time);
            assert!(v5.trust <= 0.20, "activation must collapse trust");
        }
        if flagged_at.is_none() && v5.flagged_malicious {
            flagged_at = Some(sim_time);
        }
        if sim_time < 29.7 {
            assert!(!v5.is_malicious(), "sleeper must masquerade before 29.7 s");
        }
    }

    // Activation at the first tick past the preset time.
    assert_eq!(activated_at, Some(29.7));

    // The authority vote confirms the collapse within the latency bound.
    let flagged_at = flagged_at.expect("sleeper must be detected");
    assert!(
        flagged_at - 29.7 <= 2.0,
        "detection latency {:.1}s exceeds bound",
        flagged_at - 29.7
    );
    assert!(flagged_at <= 31.5);

    assert!(sim.stats().detections_true_positive >= 1);
}

/// Overlap merge: close heads, higher-trust head retained, no election.
#[test]
fn scenario_merge_close_heads() {
    let clustering_config = ClusteringConfig::default();
    let mut engine = ClusteringEngine::new(clustering_config.clone());
    let mut store = VehicleStore::new(300.0);

    // C1: head 1 at (0,0), members within 100 m. C2: head 10 at (150,0).
    for (id, x) in [(1u64, 0.0), (2, 40.0), (3, 60.0), (4, 80.0), (5, 100.0)] {
        store.upsert(vehicle_at(id, x, 0.0, if id == 1 { 0.9 } else { 0.7 }));
    }
    for (id, x) in [(10u64, 150.0), (11, 190.0), (12, 210.0), (13, 230.0), (14, 250.0)] {
        store.upsert(vehicle_at(id, x, 0.0, if id == 10 { 0.8 } else { 0.7 }));
    }

    for (head, ids) in [(1u64, [1u64, 2, 3, 4, 5]), (10u64, [10u64, 11, 12, 13, 14])] {
        let cid = engine.allocate_id();
        let members: BTreeSet<VehicleId> = ids.into_iter().collect();
        engine.insert_cluster(&mut store, Cluster::new(cid, members, 0.0));
        let cluster = engine.cluster_mut(cid).unwrap();
        cluster.head_id = Some(head);
        cluster.state = ClusterState::Stable;
        store.get_mut(head).unwrap().is_head = true;
    }

    let mut manager = ClusterManager::new(
        clustering_config,
        TrustConfig::default(),
        ElectionConfig::default(),
        ProtocolConfig::default(),
    );
    let outcome = manager.process_tick(&mut engine, &mut store, 5.0, 0.1);

    // d_heads = 150 m < 200 m: the merge fires.
    assert_eq!(outcome.merges.len(), 1);
    let merge = outcome.merges[0];

    let merged = engine.cluster(merge.primary).unwrap();
    assert_eq!(merged.len(), 10);
    // trust(h1) = 0.9 > trust(h2) = 0.8: head 1 is retained.
    assert_eq!(merged.head_id, Some(1));
    assert_eq!(merge.primary_head, 1);
    assert_eq!(merge.absorbed_head, 10);
    assert!(!store.get(10).unwrap().is_head);
    // The loser's id is retired and no election was triggered.
    assert!(engine.cluster(merge.absorbed).is_none());
    assert!(!outcome.reelect.contains(&merge.primary));
}

/// Adversary exclusion: a 0.25-trust vehicle drops out of clustering and
/// never appears as an election candidate.
#[test]
fn scenario_adversary_exclusion() {
    let mut sim = Simulation::new(SimulationConfig::with_seed(9)).unwrap();
    let mut traffic = ScriptedSource::convoy(6, 40.0, 20.0);

    // Let the cluster form and elect.
    for tick in 0..5u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        sim.tick(&snapshots).unwrap();
    }
    let cid = *sim.clusters().keys().next().unwrap();
    assert!(sim.clusters()[&cid].contains(3));

    // Vehicle 3's trust collapses below the clustering floor.
    sim.store_mut().get_mut(3).unwrap().set_trust(0.25);

    // Advance past the next clustering pass at t = 1.0.
    let mut records = Vec::new();
    for tick in 5..12u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        records.extend(sim.tick(&snapshots).unwrap().elections);
    }
    assert!(sim.store().get(3).unwrap().cluster_id.is_none());

    // Degrade the head so a re-election fires; v3 must not be a candidate.
    let head = sim.clusters().values().next().unwrap().head_id.unwrap();
    sim.store_mut().get_mut(head).unwrap().set_trust(0.55);
    for tick in 12..14u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        records.extend(sim.tick(&snapshots).unwrap().elections);
    }

    let reelection = records.last().expect("re-election ran");
    assert!(reelection.candidates.iter().all(|c| c.id != 3));
    assert!(reelection.votes.iter().all(|v| v.voter != 3));
}

/// Head trust drop: three severity-0.8 evidence events in one tick push a
/// 0.65-trust head below 0.6 and the re-election commits the same tick.
#[test]
fn scenario_reelection_on_head_trust_drop() {
    let mut sim = Simulation::new(SimulationConfig::with_seed(21)).unwrap();
    let mut traffic = ScriptedSource::convoy(6, 40.0, 20.0);

    for tick in 0..5u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        sim.tick(&snapshots).unwrap();
    }
    let cid = *sim.clusters().keys().next().unwrap();
    let head = sim.clusters()[&cid].head_id.unwrap();
    sim.store_mut().get_mut(head).unwrap().set_trust(0.65);

    // Three malicious-evidence events, each costing 0.05 * 1.8 = 0.09.
    for _ in 0..3 {
        sim.record_event(head, head + 100, TrustEventKind::MaliciousEvidence { severity: 0.8 });
    }
    let trust_after = sim.store().get(head).unwrap().trust;
    assert!(trust_after < 0.6);
    assert!(trust_after >= 0.3, "evidence alone must not flag the head");

    let snapshots = traffic.next_tick(5, 0.5, 0.1);
    let report = sim.tick(&snapshots).unwrap();

    let reelection = report
        .elections
        .iter()
        .find(|r| r.cluster_id == cid)
        .expect("re-election within the same tick");
    assert_ne!(reelection.winner_id, head);
    assert!(!sim.store().get(head).unwrap().is_head);
}

/// Empty candidate set: an all-malicious cluster dissolves at tick end.
#[test]
fn scenario_empty_candidates_dissolves() {
    let mut sim = Simulation::new(SimulationConfig::with_seed(31)).unwrap();
    let mut traffic = ScriptedSource::convoy(5, 40.0, 20.0);

    for tick in 0..5u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        sim.tick(&snapshots).unwrap();
    }
    let cid = *sim.clusters().keys().next().unwrap();
    let members: Vec<VehicleId> = sim.clusters()[&cid].members.iter().copied().collect();
    assert!(!members.is_empty());

    // Every member is flagged malicious between clustering passes.
    for &id in &members {
        sim.store_mut().get_mut(id).unwrap().flagged_malicious = true;
    }

    let snapshots = traffic.next_tick(5, 0.5, 0.1);
    sim.tick(&snapshots).unwrap();

    // The infeasible election dissolved the cluster and released everyone.
    assert!(sim.clusters().get(&cid).is_none());
    for &id in &members {
        assert!(sim.store().get(id).unwrap().cluster_id.is_none());
    }
    assert_eq!(sim.stats().elections_infeasible, 1);
}

/// Boundary: a co-located fleet larger than the size cap partitions into
/// `ceil(N / max_cluster_size)` clusters.
#[test]
fn boundary_colocated_fleet_partitions() {
    let mut config = SimulationConfig::with_seed(41);
    // Keep the adversary out so all 25 vehicles are eligible.
    config.adversary.malicious_interval = 10_000;

    let mut sim = Simulation::new(config).unwrap();
    let vehicles: Vec<ScriptedVehicle> = (0..25u64)
        .map(|i| ScriptedVehicle {
            id: i,
            origin: Point2::new((i % 5) as f64 * 3.0, (i / 5) as f64 * 3.0),
            velocity: Vector2::new(20.0, 0.0),
            lane: 0,
            is_emergency: false,
        })
        .collect();
    let mut traffic = ScriptedSource::new(vehicles);

    for tick in 0..3u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        sim.tick(&snapshots).unwrap();
    }

    assert_eq!(sim.clusters().len(), 3);
    let total: usize = sim.clusters().values().map(|c| c.len()).sum();
    assert_eq!(total, 25);
    assert!(sim.clusters().values().all(|c| c.len() <= 10));
}

/// Boundary: one vehicle produces no clusters, no elections, no errors.
#[test]
fn boundary_single_vehicle() {
    let mut sim = Simulation::new(SimulationConfig::with_seed(51)).unwrap();
    let mut traffic = ScriptedSource::convoy(1, 40.0, 20.0);

    for tick in 0..30u64 {
        let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
        sim.tick(&snapshots).unwrap();
    }

    assert!(sim.clusters().is_empty());
    let stats = sim.stats();
    assert_eq!(stats.elections_majority + stats.elections_fallback, 0);
    assert_eq!(stats.invariant_heals, 0);
}

/// Determinism: identical configuration and traffic reproduce identical
/// partitions and election outcomes.
#[test]
fn property_identical_runs_agree() {
    let run = || {
        let mut config = SimulationConfig::with_seed(77);
        config.adversary.sleeper_ids = vec![3];
        let mut sim = Simulation::new(config).unwrap();
        let mut traffic = ScriptedSource::lanes(3, 10, 35.0, 18.0);

        let mut winners = Vec::new();
        for tick in 0..120u64 {
            let snapshots = traffic.next_tick(tick, tick as f64 * 0.1, 0.1);
            let report = sim.tick(&snapshots).unwrap();
            winners.extend(report.elections.iter().map(|r| (r.tick, r.winner_id)));
        }
        let memberships: Vec<(u64, Vec<VehicleId>)> = sim
            .clusters()
            .values()
            .map(|c| (c.id, c.members.iter().copied().collect()))
            .collect();
        (winners, memberships)
    };

    assert_eq!(run(), run());
}
