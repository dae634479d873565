//! Async run loop around the synchronous tick core
//!
//! The runner pulls snapshots from the kinematics source, advances the
//! simulation, and pushes results into the report sink. A run is
//! cancellable only at tick boundaries; a partially executed tick is never
//! observable from outside.

use crate::reporter::ReportSink;
use crate::source::KinematicsSource;
use crate::Simulation;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

/// Drives a simulation to completion or cancellation
pub struct Runner<S, R> {
    simulation: Simulation,
    source: S,
    sink: R,
    cancel: watch::Receiver<bool>,
}

impl<S: KinematicsSource, R: ReportSink> Runner<S, R> {
    /// Build a runner plus the handle that cancels it at a tick boundary
    pub fn new(simulation: Simulation, source: S, sink: R) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                simulation,
                source,
                sink,
                cancel: rx,
            },
            tx,
        )
    }

    /// Run for `ticks` ticks; returns the number actually executed
    pub async fn run(&mut self, ticks: u64) -> Result<u64> {
        let dt = self.simulation.config().tick_dt;
        let mut executed = 0u64;

        for _ in 0..ticks {
            if *self.cancel.borrow() {
                info!(executed, "run cancelled at tick boundary");
                break;
            }

            let tick = self.simulation.current_tick();
            let sim_time = self.simulation.sim_time();
            let snapshots = self.source.next_tick(tick, sim_time, dt);

            let report = self
                .simulation
                .tick(&snapshots)
                .with_context(|| format!("tick {tick} failed"))?;

            for record in &report.elections {
                self.sink
                    .on_election(record)
                    .await
                    .context("reporter rejected election record")?;
            }
            self.sink
                .on_tick(&report.snapshot)
                .await
                .context("reporter rejected tick snapshot")?;
            executed += 1;
        }

        Ok(executed)
    }

    /// The finished simulation, for inspection after a run
    pub fn into_parts(self) -> (Simulation, S, R) {
        (self.simulation, self.source, self.sink)
    }
}
