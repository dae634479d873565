//! Trust-weighted cluster-head election
//!
//! Every eligible member is scored on five normalized metrics (trust,
//! resources, stability, behavior, centrality) and the composite decides
//! the ballot every member casts. Vote power equals voter trust; a winner
//! below the majority share still takes office, recorded as a fallback.
//! Scoring is deterministic given the member states, so identical inputs
//! elect identical heads.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};
use vanetsim_core::cluster::{Cluster, ClusterId};
use vanetsim_core::config::{ElectionConfig, SimulationConfig};
use vanetsim_core::error::{SimError, SimResult};
use vanetsim_core::store::VehicleStore;
use vanetsim_core::vehicle::VehicleId;

use nalgebra::Point2;

/// Per-candidate metric breakdown
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CandidateScore {
    pub id: VehicleId,
    pub trust_metric: f64,
    pub resource: f64,
    pub stability: f64,
    pub behavior: f64,
    pub centrality: f64,
    pub composite: f64,
}

/// One member's ballot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: VehicleId,
    pub weight: f64,
    pub vote_for: VehicleId,
}

/// How the winner was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionMode {
    Majority,
    Fallback,
}

/// Full record of one election, exported to the reporter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionRecord {
    pub cluster_id: ClusterId,
    pub tick: u64,
    pub sim_time_s: f64,
    pub candidates: Vec<CandidateScore>,
    pub votes: Vec<VoteRecord>,
    pub winner_id: VehicleId,
    pub vote_share: f64,
    pub mode: ElectionMode,
    /// Pure computation time plus the modeled DSRC round latency
    pub election_time_ms: f64,
}

/// Member state snapshot taken before scoring
#[derive(Debug, Clone, Copy)]
struct MemberInfo {
    id: VehicleId,
    position: Point2<f64>,
    trust: f64,
    history_mean: f64,
    bandwidth_mbps: f64,
    processing_ghz: f64,
    time_as_head: f64,
    message_authenticity: f64,
    cooperation_rate: f64,
    eligible: bool,
}

/// Computes metrics and runs the consensus vote for one cluster
pub struct ElectionEngine {
    config: ElectionConfig,
    min_trust_threshold: f64,
    max_simulation_time: f64,
    max_cluster_radius: f64,
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

impl ElectionEngine {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            config: config.election.clone(),
            min_trust_threshold: config.trust.min_trust_threshold,
            max_simulation_time: config.max_simulation_time,
            max_cluster_radius: config.clustering.max_cluster_radius,
        }
    }

    /// Elect a head for `cluster`, committing the result to the records
    ///
    /// Fails with `ElectionInfeasible` when no member is eligible; the
    /// caller marks the cluster for dissolution.
    pub fn run(
        &self,
        cluster: &mut Cluster,
        store: &mut VehicleStore,
        sim_time: f64,
        tick: u64,
    ) -> SimResult<ElectionRecord> {
        let started = Instant::now();

        let members: Vec<MemberInfo> = cluster
            .members
            .iter()
            .filter_map(|id| store.get(*id))
            .map(|v| MemberInfo {
                id: v.id,
                position: v.position,
                trust: v.trust,
                history_mean: v.history.mean_or(v.trust),
                bandwidth_mbps: v.bandwidth_mbps,
                processing_ghz: v.processing_ghz,
                time_as_head: v.time_as_head,
                message_authenticity: v.sub_scores.message_authenticity,
                cooperation_rate: v.cooperation_rate(),
                eligible: v.trust >= self.min_trust_threshold
                    && !(self.config.exclude_malicious && v.is_malicious()),
            })
            .collect();

        let candidates: Vec<&MemberInfo> = members.iter().filter(|m| m.eligible).collect();
        if candidates.is_empty() {
            debug!(cluster = cluster.id, "no eligible head candidates");
            return Err(SimError::ElectionInfeasible(cluster.id));
        }

        let centroid = member_centroid(&members);
        let mut scored: Vec<CandidateScore> = candidates
            .par_iter()
            .map(|c| self.score(c, &members, centroid))
            .collect();
        scored.sort_by(|a, b| {
            b.composite
                .partial_cmp(&a.composite)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.trust_metric
                        .partial_cmp(&a.trust_metric)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.id.cmp(&b.id))
        });

        // Every member votes for the top-composite candidate with weight
        // equal to its own trust.
        let best = scored[0];
        let votes: Vec<VoteRecord> = members
            .iter()
            .map(|m| VoteRecord {
                voter: m.id,
                weight: m.trust,
                vote_for: best.id,
            })
            .collect();
        let total_power: f64 = votes.iter().map(|v| v.weight).sum();
        let winner_power: f64 = votes
            .iter()
            .filter(|v| v.vote_for == best.id)
            .map(|v| v.weight)
            .sum();

        let (vote_share, mode) = if total_power > 0.0 {
            let share = winner_power / total_power;
            if share >= self.config.majority_share {
                (share, ElectionMode::Majority)
            } else {
                (share, ElectionMode::Fallback)
            }
        } else {
            (0.0, ElectionMode::Fallback)
        };

        // Commit: clear the previous head, install the winner, keep the
        // runner-up warm as co-leader when trusted enough.
        if let Some(previous) = cluster.head_id {
            if let Some(vehicle) = store.get_mut(previous) {
                vehicle.is_head = false;
            }
        }
        if let Some(vehicle) = store.get_mut(best.id) {
            vehicle.is_head = true;
            vehicle.cluster_id = Some(cluster.id);
        }
        cluster.head_id = Some(best.id);
        cluster.co_leader_id = scored.get(1).and_then(|runner_up| {
            let trusted = members
                .iter()
                .find(|m| m.id == runner_up.id)
                .map(|m| m.trust >= self.config.co_leader_min_trust)
                .unwrap_or(false);
            trusted.then_some(runner_up.id)
        });
        cluster.last_election_time = sim_time;

        let election_time_ms =
            started.elapsed().as_secs_f64() * 1000.0 + self.config.dsrc_latency_ms;
        info!(
            cluster = cluster.id,
            winner = best.id,
            share = vote_share,
            ?mode,
            "head elected"
        );

        Ok(ElectionRecord {
            cluster_id: cluster.id,
            tick,
            sim_time_s: sim_time,
            candidates: scored,
            votes,
            winner_id: best.id,
            vote_share,
            mode,
            election_time_ms,
        })
    }

    /// The five normalized metrics and their weighted composite
    fn score(
        &self,
        candidate: &MemberInfo,
        members: &[MemberInfo],
        centroid: Point2<f64>,
    ) -> CandidateScore {
        // Trust: historical mean blended with the trust-weighted opinion of
        // the candidate's cluster neighbors.
        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for m in members {
            if m.id == candidate.id {
                continue;
            }
            weight_sum += m.trust;
            weighted += m.trust * m.trust;
        }
        let social_trust = if weight_sum > 0.0 {
            weighted / weight_sum
        } else {
            candidate.trust
        };
        let trust_metric = 0.5 * candidate.history_mean + 0.5 * social_trust;

        let resource = 0.5 * normalize(candidate.bandwidth_mbps, 50.0, 150.0)
            + 0.5 * normalize(candidate.processing_ghz, 1.0, 4.0);

        let neighbor_count = members
            .iter()
            .filter(|m| {
                m.id != candidate.id
                    && (m.position - candidate.position).norm() <= self.max_cluster_radius
            })
            .count();
        let stability = 0.5 * (candidate.time_as_head / self.max_simulation_time).min(1.0)
            + 0.5 * (neighbor_count as f64 / 20.0).min(1.0);

        let behavior = 0.5 * candidate.message_authenticity + 0.5 * candidate.cooperation_rate;

        let centrality =
            1.0 - ((candidate.position - centroid).norm() / self.max_cluster_radius).min(1.0);

        let w = &self.config.weights;
        let composite = w.trust * trust_metric
            + w.resource * resource
            + w.stability * stability
            + w.behavior * behavior
            + w.centrality * centrality;

        CandidateScore {
            id: candidate.id,
            trust_metric,
            resource,
            stability,
            behavior,
            centrality,
            composite,
        }
    }
}

fn member_centroid(members: &[MemberInfo]) -> Point2<f64> {
    if members.is_empty() {
        return Point2::origin();
    }
    let sum = members
        .iter()
        .fold(nalgebra::Vector2::zeros(), |acc, m| acc + m.position.coords);
    Point2::from(sum / members.len() as f64)
}
