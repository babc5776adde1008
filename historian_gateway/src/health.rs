//! Runtime health: sample recency and consecutive error tracking.

use crate::drivers::traits::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Immutable copy of the shared health state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub utc_now: DateTime<Utc>,
    pub status: HealthStatus,
    pub last_good_sample_utc: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub message: Option<String>,
}

/// Watchdog timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_degraded_after_ms")]
    pub health_degraded_after_ms: u64,
    #[serde(default = "default_unhealthy_after_ms")]
    pub health_unhealthy_after_ms: u64,
    /// Minimum gap between reconnect attempts while the channel is down.
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
}

fn default_heartbeat_ms() -> u64 {
    1000
}

fn default_degraded_after_ms() -> u64 {
    10_000
}

fn default_unhealthy_after_ms() -> u64 {
    30_000
}

fn default_reconnect_ms() -> u64 {
    3000
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            heartbeat_ms: default_heartbeat_ms(),
            health_degraded_after_ms: default_degraded_after_ms(),
            health_unhealthy_after_ms: default_unhealthy_after_ms(),
            reconnect_ms: default_reconnect_ms(),
        }
    }
}

#[derive(Debug)]
struct HealthState {
    status: HealthStatus,
    last_good_sample_utc: Option<DateTime<Utc>>,
    consecutive_errors: u32,
    message: Option<String>,
}

/// Shared health handle. One per process, passed around as `Arc<HealthMonitor>`.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    state: RwLock<HealthState>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        HealthMonitor {
            config,
            state: RwLock::new(HealthState {
                status: HealthStatus::Healthy,
                last_good_sample_utc: None,
                consecutive_errors: 0,
                message: None,
            }),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HealthState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HealthState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let s = self.read();
        HealthSnapshot {
            utc_now: Utc::now(),
            status: s.status,
            last_good_sample_utc: s.last_good_sample_utc,
            consecutive_errors: s.consecutive_errors,
            message: s.message.clone(),
        }
    }

    pub fn report_good_sample(&self) {
        self.report_good_sample_at(Utc::now());
    }

    pub fn report_good_sample_at(&self, at: DateTime<Utc>) {
        let mut s = self.write();
        s.last_good_sample_utc = Some(at);
        s.consecutive_errors = 0;
        s.status = HealthStatus::Healthy;
        s.message = Some("OK".to_string());
    }

    pub fn report_error(&self) {
        let mut s = self.write();
        s.consecutive_errors = s.consecutive_errors.saturating_add(1);
        if s.status == HealthStatus::Healthy {
            s.status = HealthStatus::Degraded;
        }
        s.message = Some(format!("Errors={}", s.consecutive_errors));
    }

    pub fn reset_errors(&self) {
        let mut s = self.write();
        s.consecutive_errors = 0;
        s.message = Some("Errors reset".to_string());
    }

    pub fn set_status(&self, status: HealthStatus, message: Option<String>) {
        let mut s = self.write();
        s.status = status;
        if message.is_some() {
            s.message = message;
        }
    }

    /// Classify by the age of the last good sample. No sample yet counts as
    /// infinitely stale.
    pub fn classify(&self, now: DateTime<Utc>) -> (HealthStatus, String) {
        let last = self.read().last_good_sample_utc;
        let age_ms = match last {
            Some(t) => (now - t).num_milliseconds().max(0) as u64,
            None => u64::MAX,
        };
        if age_ms >= self.config.health_unhealthy_after_ms {
            if last.is_none() {
                (HealthStatus::Unhealthy, "No good samples yet".to_string())
            } else {
                (HealthStatus::Unhealthy, format!("No good samples for {} ms", age_ms))
            }
        } else if age_ms >= self.config.health_degraded_after_ms {
            (HealthStatus::Degraded, format!("Stale samples for {} ms", age_ms))
        } else {
            (HealthStatus::Healthy, "Fresh".to_string())
        }
    }

    /// One watchdog tick: optionally nudge a dropped channel, then classify.
    pub async fn tick(&self, channel: Option<&dyn Channel>, last_reconnect: &mut Option<Instant>) {
        if let Some(channel) = channel {
            if !channel.is_connected() {
                let due = last_reconnect
                    .map(|t| t.elapsed() >= Duration::from_millis(self.config.reconnect_ms))
                    .unwrap_or(true);
                if due {
                    *last_reconnect = Some(Instant::now());
                    match channel.connect().await {
                        Ok(true) => info!("Watchdog: channel reconnected"),
                        Ok(false) => {
                            warn!("Watchdog: channel still disconnected");
                            self.report_error();
                        }
                        Err(e) => {
                            error!("Watchdog: reconnect failed: {}", e);
                            self.report_error();
                        }
                    }
                }
            }
        }
        let (status, message) = self.classify(Utc::now());
        self.set_status(status, Some(message));
    }

    /// Heartbeat loop. Stops promptly when `cancel` fires.
    pub async fn run(self: Arc<Self>, channel: Option<Arc<dyn Channel>>, cancel: CancellationToken) {
        info!(
            "Health monitor started. Heartbeat={}ms, DegradedAfter={}ms, UnhealthyAfter={}ms",
            self.config.heartbeat_ms, self.config.health_degraded_after_ms, self.config.health_unhealthy_after_ms
        );
        let heartbeat = Duration::from_millis(self.config.heartbeat_ms.max(1));
        let mut last_reconnect = None;

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick(channel.as_deref(), &mut last_reconnect) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(heartbeat) => {}
            }
        }
        info!("Health monitor stopped.");
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
