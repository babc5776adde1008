//! Wires channel, health, sampling and history into background tasks.

use crate::api::diagnostics::DiagnosticsState;
use crate::archive::ArchiveEngine;
use crate::config::settings::Settings;
use crate::drivers::resilient::ResilientChannel;
use crate::drivers::s7::S7Channel;
use crate::drivers::traits::{Channel, PlcConfig};
use crate::drivers::transport::{BlockTransport, MemoryTransport};
use crate::error::{GatewayError, GatewayResult};
use crate::health::HealthMonitor;
use crate::history::{HistoryConfig, HistoryStore, HistoryWriter, NullHistoryStore, SqliteHistoryStore};
use crate::sampling::SamplingLoop;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Simulated controller memory sized from `plc.simulated_blocks`.
pub fn simulated_transport(plc: &PlcConfig) -> MemoryTransport {
    plc.simulated_blocks
        .iter()
        .fold(MemoryTransport::new(), |t, b| t.with_block(b.number, b.size))
}

/// Transport for the configured controller. Only the simulated memory is
/// built in; a network transport is passed to [`Runtime::new`] directly.
pub fn build_transport(plc: &PlcConfig) -> GatewayResult<Arc<dyn BlockTransport>> {
    if plc.simulate {
        info!("Using simulated controller memory for '{}'", plc.name);
        Ok(Arc::new(simulated_transport(plc)))
    } else {
        Err(GatewayError::InvalidConfig(format!(
            "no transport available for {}; set plc.simulate = true or supply one",
            plc.endpoint()
        )))
    }
}

/// SQLite store when history is enabled, a discarding store otherwise.
pub fn open_store(config: &HistoryConfig) -> GatewayResult<Arc<dyn HistoryStore>> {
    if config.enabled {
        Ok(Arc::new(SqliteHistoryStore::open(&config.database_path)?))
    } else {
        warn!("History disabled; samples will not be persisted");
        Ok(Arc::new(NullHistoryStore::default()))
    }
}

struct Tasks {
    sampling: JoinHandle<()>,
    watchdog: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct Runtime {
    channel: Arc<dyn Channel>,
    health: Arc<HealthMonitor>,
    archive: Arc<ArchiveEngine>,
    writer: Arc<HistoryWriter>,
    sampling: Arc<SamplingLoop>,
    producers: CancellationToken, // sampling + watchdog
    writer_cancel: CancellationToken,
    start_time: Instant,
    tasks: Option<Tasks>,
}

impl Runtime {
    pub fn new(settings: &Settings, transport: Arc<dyn BlockTransport>, store: Arc<dyn HistoryStore>) -> Self {
        let s7 = S7Channel::new(settings.plc.clone(), transport)
            .with_operation_timeout(settings.communication.operation_timeout());
        let definitions = settings.tag_definitions();
        for def in &definitions {
            s7.add_tag(def.clone());
        }
        info!("{} tags registered on channel '{}'", definitions.len(), settings.plc.name);

        let channel: Arc<dyn Channel> = Arc::new(ResilientChannel::new(s7, settings.communication.retry_policy()));
        let health = Arc::new(HealthMonitor::new(settings.runtime.clone()));
        let archive = Arc::new(ArchiveEngine::new());
        let writer = Arc::new(HistoryWriter::new(settings.history.clone(), store));
        let sampling = Arc::new(SamplingLoop::new(
            &settings.sampling,
            Arc::clone(&channel),
            &definitions,
            settings.archive_configs(),
            Arc::clone(&archive),
            Arc::clone(&health),
            Arc::clone(&writer),
        ));

        let root = CancellationToken::new();
        Runtime {
            channel,
            health,
            archive,
            writer,
            sampling,
            producers: root.child_token(),
            writer_cancel: root.child_token(),
            start_time: Instant::now(),
            tasks: None,
        }
    }

    pub fn channel(&self) -> Arc<dyn Channel> {
        Arc::clone(&self.channel)
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn archive(&self) -> Arc<ArchiveEngine> {
        Arc::clone(&self.archive)
    }

    pub fn writer(&self) -> Arc<HistoryWriter> {
        Arc::clone(&self.writer)
    }

    pub fn sampling(&self) -> Arc<SamplingLoop> {
        Arc::clone(&self.sampling)
    }

    pub fn diagnostics_state(&self) -> DiagnosticsState {
        DiagnosticsState {
            health: self.health(),
            channel: self.channel(),
            queue: self.writer.queue(),
            start_time: self.start_time,
        }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.is_some()
    }

    /// Connect once, then spawn the background loops. A failed first connect
    /// is left to the watchdog.
    pub async fn start(&mut self) {
        if self.tasks.is_some() {
            return;
        }
        match self.channel.connect().await {
            Ok(true) => {}
            Ok(false) => warn!("Initial connect failed; watchdog will retry"),
            Err(e) => error!("Initial connect error: {}", e),
        }

        let sampling = tokio::spawn(Arc::clone(&self.sampling).run(self.producers.clone()));
        let watchdog = tokio::spawn(Arc::clone(&self.health).run(Some(self.channel()), self.producers.clone()));
        let writer = tokio::spawn(Arc::clone(&self.writer).run(self.writer_cancel.clone()));
        self.tasks = Some(Tasks {
            sampling,
            watchdog,
            writer,
        });
        info!("Runtime started.");
    }

    /// Stop producers, let the writer do its final flush, then disconnect.
    pub async fn shutdown(mut self) {
        info!("Runtime shutting down...");
        self.producers.cancel();
        if let Some(tasks) = self.tasks.take() {
            if let Err(e) = tasks.sampling.await {
                error!("Sampling task ended abnormally: {}", e);
            }
            if let Err(e) = tasks.watchdog.await {
                error!("Watchdog task ended abnormally: {}", e);
            }
            self.writer_cancel.cancel();
            if let Err(e) = tasks.writer.await {
                error!("History writer task ended abnormally: {}", e);
            }
        }
        self.channel.disconnect().await;
        info!("Runtime stopped.");
    }
}
