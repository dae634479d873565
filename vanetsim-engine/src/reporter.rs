//! Reporter collaborator interface
//!
//! The engine pushes one statistics snapshot per tick plus a record per
//! election. The sink decides the encoding; a JSON-lines sink ships as the
//! default collaborator and a collecting sink backs tests and demos.

use crate::stats::StatsSnapshot;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use vanetsim_cluster::ElectionRecord;
use vanetsim_core::error::SimResult;

/// Receives per-tick statistics and election records
#[async_trait]
pub trait ReportSink: Send {
    async fn on_tick(&mut self, snapshot: &StatsSnapshot) -> SimResult<()>;
    async fn on_election(&mut self, record: &ElectionRecord) -> SimResult<()>;
}

/// Tagged record layout of the JSON-lines stream
#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum ReportLine<'a> {
    Tick(&'a StatsSnapshot),
    Election(&'a ElectionRecord),
}

/// Writes one JSON object per line to any async writer
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write_line(&mut self, line: &ReportLine<'_>) -> SimResult<()> {
        let mut bytes = serde_json::to_vec(line)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for JsonLinesSink<W> {
    async fn on_tick(&mut self, snapshot: &StatsSnapshot) -> SimResult<()> {
        self.write_line(&ReportLine::Tick(snapshot)).await
    }

    async fn on_election(&mut self, record: &ElectionRecord) -> SimResult<()> {
        self.write_line(&ReportLine::Election(record)).await
    }
}

/// Keeps everything in memory; used by tests and demos
#[derive(Default)]
pub struct CollectingSink {
    pub snapshots: Vec<StatsSnapshot>,
    pub elections: Vec<ElectionRecord>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn on_tick(&mut self, snapshot: &StatsSnapshot) -> SimResult<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn on_election(&mut self, record: &ElectionRecord) -> SimResult<()> {
        self.elections.push(record.clone());
        Ok(())
    }
}
