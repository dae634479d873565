//! Highway convoy demo: three lanes of traffic clustering and electing
//!
//! Run with: cargo run --example highway_convoy

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

    let mut config = SimulationConfig::with_seed(2024);
    config.clustering.algorithm = ClusteringAlgorithm::Mobility;

    let simulation = Simulation::new(config)?;
    let traffic = ScriptedSource::lanes(3, 20, 35.0, 24.0);
    let (mut runner, _cancel) = Runner::new(simulation, traffic, CollectingSink::default());

    // 60 simulated seconds at 0.1 s per tick.
    runner.run(600).await?;

    let (simulation, _, sink) = runner.into_parts();
    let stats = simulation.stats();

    println!("\n=== HIGHWAY CONVOY SUMMARY ===");
    println!("Vehicles:            {}", simulation.store().len());
    println!("Clusters:            {}", simulation.clusters().len());
    println!("Elections (majority): {}", stats.elections_majority);
    println!("Elections (fallback): {}", stats.elections_fallback);
    println!("Merges / splits:     {} / {}", stats.merges, stats.splits);
    println!("Dissolutions:        {}", stats.dissolutions);
    println!("Avg tick time:       {:.3} ms", stats.avg_tick_time_ms);

    if let Some(last) = sink.elections.last() {
        println!(
            "Last election: cluster {} -> head {} (share {:.2}, {:?})",
            last.cluster_id, last.winner_id, last.vote_share, last.mode
        );
    }

    Ok(())
}
