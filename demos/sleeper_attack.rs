//! Sleeper-agent attack demo: two sleepers activate mid-run and the
//! cluster authority vote hunts them down
//!
//! Run with: cargo run --example sleeper_attack

use anyhow::Result;
use vanetsim::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = SimulationConfig::with_seed(7);
    config.adversary.sleeper_ids = vec![5, 117];

    let simulation = Simulation::new(config)?;
    let traffic = ScriptedSource::convoy(150, 30.0, 20.0);
    let (mut runner, _cancel) = Runner::new(simulation, traffic, CollectingSink::default());

    // 90 simulated seconds; both sleepers activate inside [20 s, 40 s].
    runner.run(900).await?;

    let (simulation, _, _) = runner.into_parts();
    let stats = simulation.stats();

    println!("\n=== SLEEPER ATTACK SUMMARY ===");
    println!("Ground-truth adversaries: {:?}", simulation.ground_truth_adversaries());
    for id in [5u64, 117] {
        if let Some(v) = simulation.store().get(id) {
            println!(
                "sleeper {id}: activated={} flagged={} trust={:.3}",
                v.adversary.is_active_malicious(),
                v.flagged_malicious,
                v.trust
            );
        }
    }
    println!("Detections: {} true / {} false",
        stats.detections_true_positive, stats.detections_false_positive);
    println!("Elections run: {}", stats.elections_majority + stats.elections_fallback);

    Ok(())
}
