//! Per-run statistics collection
//!
//! Counters accumulate behind a `parking_lot` lock so the collector can be
//! shared with observers while a run is in flight. A snapshot is a plain
//! clone handed to the reporter each tick.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vanetsim_cluster::ElectionMode;
use vanetsim_core::message::MessageKind;

/// Election-duration histogram bucket upper bounds (milliseconds)
pub const ELECTION_TIME_BUCKETS_MS: [f64; 5] = [0.5, 1.0, 2.0, 5.0, 10.0];

/// Cloneable snapshot of all run counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Identifies the run across reporter records
    pub run_id: Uuid,
    pub tick: u64,
    pub sim_time_s: f64,

    /// Messages sent, keyed by wire id
    pub sent_by_kind: BTreeMap<u8, u64>,
    /// Messages delivered, keyed by wire id
    pub received_by_kind: BTreeMap<u8, u64>,
    pub dropped_expired: u64,
    pub dropped_duplicate: u64,
    pub dropped_unknown_kind: u64,
    pub dropped_unknown_recipient: u64,
    pub shed_on_overflow: u64,

    pub elections_majority: u64,
    pub elections_fallback: u64,
    pub elections_infeasible: u64,
    /// Histogram over `ELECTION_TIME_BUCKETS_MS`, final slot is overflow
    pub election_time_histogram: [u64; 6],

    pub merges: u64,
    pub splits: u64,
    pub dissolutions: u64,
    pub clusters_formed: u64,

    pub detections_true_positive: u64,
    pub detections_false_positive: u64,
    pub invariant_heals: u64,

    /// Wall-clock tick timing
    pub avg_tick_time_ms: f64,
    pub min_tick_time_ms: f64,
    pub max_tick_time_ms: f64,
}

/// Shared, lock-guarded statistics collector
#[derive(Clone)]
pub struct StatisticsCollector {
    inner: Arc<RwLock<StatsSnapshot>>,
    tick_times: Arc<RwLock<Vec<Duration>>>,
}

impl StatisticsCollector {
    pub fn new(run_id: Uuid) -> Self {
        let snapshot = StatsSnapshot {
            run_id,
            min_tick_time_ms: f64::INFINITY,
            ..StatsSnapshot::default()
        };
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
            tick_times: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn record_sent(&self, kind: MessageKind) {
        *self
            .inner
            .write()
            .sent_by_kind
            .entry(kind.wire_id())
            .or_insert(0) += 1;
    }

    pub fn record_received(&self, kind: MessageKind) {
        *self
            .inner
            .write()
            .received_by_kind
            .entry(kind.wire_id())
            .or_insert(0) += 1;
    }

    pub fn record_dropped_expired(&self) {
        self.inner.write().dropped_expired += 1;
    }

    pub fn record_dropped_duplicate(&self) {
        self.inner.write().dropped_duplicate += 1;
    }

    pub fn record_dropped_unknown_kind(&self) {
        self.inner.write().dropped_unknown_kind += 1;
    }

    pub fn record_dropped_unknown_recipient(&self) {
        self.inner.write().dropped_unknown_recipient += 1;
    }

    pub fn record_shed(&self, count: u64) {
        self.inner.write().shed_on_overflow += count;
    }

    pub fn record_election(&self, mode: ElectionMode, election_time_ms: f64) {
        let mut inner = self.inner.write();
        match mode {
            ElectionMode::Majority => inner.elections_majority += 1,
            ElectionMode::Fallback => inner.elections_fallback += 1,
        }
        let bucket = ELECTION_TIME_BUCKETS_MS
            .iter()
            .position(|&bound| election_time_ms <= bound)
            .unwrap_or(ELECTION_TIME_BUCKETS_MS.len());
        inner.election_time_histogram[bucket] += 1;
    }

    pub fn record_election_infeasible(&self) {
        self.inner.write().elections_infeasible += 1;
    }

    pub fn record_merges(&self, count: u64) {
        self.inner.write().merges += count;
    }

    pub fn record_splits(&self, count: u64) {
        self.inner.write().splits += count;
    }

    pub fn record_dissolutions(&self, count: u64) {
        self.inner.write().dissolutions += count;
    }

    pub fn record_clusters_formed(&self, count: u64) {
        self.inner.write().clusters_formed += count;
    }

    pub fn record_detection(&self, ground_truth_adversary: bool) {
        let mut inner = self.inner.write();
        if ground_truth_adversary {
            inner.detections_true_positive += 1;
        } else {
            inner.detections_false_positive += 1;
        }
    }

    pub fn record_invariant_heals(&self, count: u64) {
        self.inner.write().invariant_heals += count;
    }

    /// Close out one tick: advance the clock and fold in wall timing
    pub fn record_tick(&self, tick: u64, sim_time_s: f64, elapsed: Duration) {
        let mut times = self.tick_times.write();
        times.push(elapsed);
        if times.len() > 1000 {
            times.drain(0..100);
        }

        let mut inner = self.inner.write();
        inner.tick = tick;
        inner.sim_time_s = sim_time_s;

        let times_ms: Vec<f64> = times.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        inner.avg_tick_time_ms = times_ms.iter().sum::<f64>() / times_ms.len() as f64;
        inner.min_tick_time_ms = times_ms.iter().copied().fold(f64::INFINITY, f64::min);
        inner.max_tick_time_ms = times_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.read().clone()
    }
}
