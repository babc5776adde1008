use super::queue::{OverflowPolicy, SampleQueue};
use super::store::HistoryStore;
use super::SamplePoint;
use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Floor for the flush interval.
const MIN_WRITE_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_write_interval_ms")]
    pub write_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Upper bound on the final flush at shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Source id stamped on every row.
    #[serde(default = "default_source")]
    pub source: u8,
}

fn default_enabled() -> bool {
    true
}

fn default_write_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_max_queue() -> usize {
    10_000
}

fn default_database_path() -> String {
    "historian.db".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

fn default_source() -> u8 {
    1
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            enabled: default_enabled(),
            write_interval_ms: default_write_interval_ms(),
            batch_size: default_batch_size(),
            max_queue: default_max_queue(),
            overflow: OverflowPolicy::default(),
            database_path: default_database_path(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            source: default_source(),
        }
    }
}

impl HistoryConfig {
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms.max(MIN_WRITE_INTERVAL_MS))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Drains the sample queue into a [`HistoryStore`] in batches.
///
/// Delivery is at most once: a batch that fails to persist is logged and
/// dropped.
pub struct HistoryWriter {
    config: HistoryConfig,
    queue: Arc<SampleQueue>,
    store: Arc<dyn HistoryStore>,
    schema_ready: AtomicBool,
}

impl HistoryWriter {
    pub fn new(config: HistoryConfig, store: Arc<dyn HistoryStore>) -> Self {
        let queue = Arc::new(SampleQueue::new(config.max_queue, config.overflow));
        HistoryWriter {
            config,
            queue,
            store,
            schema_ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn queue(&self) -> Arc<SampleQueue> {
        Arc::clone(&self.queue)
    }

    pub fn enqueue(&self, point: SamplePoint) -> bool {
        self.queue.enqueue(point)
    }

    pub fn enqueue_many(&self, points: Vec<SamplePoint>) -> usize {
        let requested = points.len();
        let queued = self.queue.enqueue_many(points);
        if queued < requested {
            warn!("History queue full: {} of {} samples refused", requested - queued, requested);
        }
        queued
    }

    /// Create the destination table if needed. Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> GatewayResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.ensure_schema())
            .await
            .map_err(|e| GatewayError::Persistence(format!("schema task failed: {}", e)))??;
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Write up to `batch_size` queued samples. Returns the number of rows
    /// persisted; an empty queue is a no-op.
    pub async fn flush_once(&self) -> GatewayResult<usize> {
        let batch = self.queue.dequeue_batch(self.config.batch_size.max(1));
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();

        if !self.schema_ready.load(Ordering::Acquire) {
            if let Err(e) = self.ensure_schema().await {
                error!("History schema unavailable, dropping {} samples: {}", count, e);
                return Err(e);
            }
        }

        let store = Arc::clone(&self.store);
        let source = self.config.source;
        let result = tokio::task::spawn_blocking(move || store.write_batch(&batch, source))
            .await
            .map_err(|e| GatewayError::Persistence(format!("write task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(written) => {
                info!("History flush OK: wrote {} rows.", written);
                Ok(written)
            }
            Err(e) => {
                // Re-check the table on the next flush in case it was dropped
                self.schema_ready.store(false, Ordering::Release);
                error!("History flush failed, dropping {} samples: {}", count, e);
                Err(e)
            }
        }
    }

    /// Periodic flush loop. Returns only on cancellation, after one final
    /// flush bounded by `shutdown_grace_ms`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "History writer started. Interval={}ms, BatchSize={}, MaxQueue={}",
            self.config.write_interval().as_millis(),
            self.config.batch_size,
            self.config.max_queue
        );

        // A failed check is retried by the next flush
        match self.ensure_schema().await {
            Ok(()) => info!("History schema ensured (samples)."),
            Err(e) => error!("History schema check failed, retrying on next flush: {}", e),
        }

        let interval = self.config.write_interval();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }
            // Errors are already logged; the loop keeps going
            let _ = self.flush_once().await;
        }

        self.final_flush().await;
        info!("History writer stopped.");
    }

    async fn final_flush(&self) {
        let grace = self.config.shutdown_grace();
        let started = Instant::now();
        let drain = async {
            let mut total = 0;
            while !self.queue.is_empty() {
                match self.flush_once().await {
                    Ok(n) => total += n,
                    // Store still failing: stop rather than drop the rest
                    Err(_) => break,
                }
            }
            total
        };
        match timeout(grace, drain).await {
            Ok(total) => debug!("Final flush wrote {} rows in {:?}", total, started.elapsed()),
            Err(_) => warn!(
                "Final flush exceeded {} ms; {} samples left unwritten",
                grace.as_millis(),
                self.queue.len()
            ),
        }
    }
}
