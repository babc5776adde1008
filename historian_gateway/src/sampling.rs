//! Periodic batch acquisition feeding the archive filter and history queue.

use crate::archive::{ArchiveConfig, ArchiveEngine};
use crate::drivers::traits::Channel;
use crate::error::GatewayResult;
use crate::health::HealthMonitor;
use crate::history::HistoryWriter;
use crate::tags::structures::{DataType, TagDefinition};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Tags to sample each tick. Empty means every catalog tag.
    #[serde(default)]
    pub sampled_tags: Vec<String>,
}

fn default_poll_ms() -> u64 {
    1000
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            poll_ms: default_poll_ms(),
            sampled_tags: Vec::new(),
        }
    }
}

/// Outcome of one tick, mostly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub requested: usize,
    pub read_ok: usize,
    pub accepted: usize,
    pub queued: usize,
}

pub struct SamplingLoop {
    poll: Duration,
    channel: Arc<dyn Channel>,
    tags: Vec<String>,
    data_types: HashMap<String, DataType>,
    archive_configs: HashMap<String, ArchiveConfig>,
    archive: Arc<ArchiveEngine>,
    health: Arc<HealthMonitor>,
    writer: Arc<HistoryWriter>,
}

impl SamplingLoop {
    /// `definitions` is the finalized tag catalog; `archive_configs` decides
    /// which of them are archived.
    pub fn new(
        config: &SamplingConfig,
        channel: Arc<dyn Channel>,
        definitions: &[TagDefinition],
        archive_configs: HashMap<String, ArchiveConfig>,
        archive: Arc<ArchiveEngine>,
        health: Arc<HealthMonitor>,
        writer: Arc<HistoryWriter>,
    ) -> Self {
        let mut tags: Vec<String> = if config.sampled_tags.is_empty() {
            definitions.iter().map(|d| d.name.clone()).collect()
        } else {
            config.sampled_tags.clone()
        };
        tags.sort();
        tags.dedup();

        let data_types = definitions
            .iter()
            .map(|d| (d.name.clone(), d.field_type.data_type()))
            .collect();

        SamplingLoop {
            poll: Duration::from_millis(config.poll_ms.max(1)),
            channel,
            tags,
            data_types,
            archive_configs,
            archive,
            health,
            writer,
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Read every sampled tag once, report health, filter and queue.
    pub async fn tick(&self) -> GatewayResult<TickReport> {
        let mut report = TickReport {
            requested: self.tags.len(),
            ..Default::default()
        };
        if self.tags.is_empty() {
            debug!("Sampling tick: no tags configured");
            return Ok(report);
        }

        let results = match self.channel.read_many(&self.tags).await {
            Ok(results) => results,
            Err(e) => {
                self.health.report_error();
                return Err(e);
            }
        };
        let timestamp = Utc::now();

        report.read_ok = results.values().filter(|v| v.is_some()).count();
        if report.read_ok > 0 {
            self.health.report_good_sample_at(timestamp);
        } else {
            self.health.report_error();
        }

        let accepted = self
            .archive
            .filter(&results, &self.data_types, &self.archive_configs, timestamp);
        report.accepted = accepted.len();
        report.queued = self.writer.enqueue_many(accepted);

        debug!(
            "Sampling tick: {}/{} read, {} accepted, {} queued",
            report.read_ok, report.requested, report.accepted, report.queued
        );
        Ok(report)
    }

    /// Tick until cancelled. A failed tick is logged and the delay re-armed.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Sampling loop started. PollMs={}, Tags=[{}]",
            self.poll.as_millis(),
            self.tags.join(", ")
        );

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.tick() => {
                    if let Err(e) = result {
                        error!("Sampling tick error: {}", e);
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.poll) => {}
            }
        }
        info!("Sampling loop stopped.");
    }
}
