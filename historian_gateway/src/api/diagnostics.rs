use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::drivers::traits::Channel;
use crate::health::{HealthMonitor, HealthStatus};
use crate::history::SampleQueue;

#[derive(Clone)]
pub struct DiagnosticsState {
    pub health: Arc<HealthMonitor>,
    pub channel: Arc<dyn Channel>,
    pub queue: Arc<SampleQueue>,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ChannelResponse {
    pub is_connected: bool,
    pub first_connect_utc: Option<DateTime<Utc>>,
    pub last_good_utc: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub reconnect_count: u64,
    pub last_reconnect_utc: Option<DateTime<Utc>>,
    pub uptime_seconds: i64,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub ok: bool,
    pub error: Option<String>,
    pub channel: ChannelResponse,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub depth: usize,
    pub capacity: usize,
    pub dropped: u64,
}

fn channel_response(channel: &dyn Channel) -> ChannelResponse {
    let h = channel.health();
    ChannelResponse {
        uptime_seconds: h.uptime_seconds(Utc::now()),
        is_connected: h.is_connected,
        first_connect_utc: h.first_connect_utc,
        last_good_utc: h.last_good_utc,
        last_error_message: h.last_error_message,
        reconnect_count: h.reconnect_count,
        last_reconnect_utc: h.last_reconnect_utc,
    }
}

// Unhealthy maps to 503 so load balancers can act on it
async fn get_health(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let code = match snapshot.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(snapshot))
}

async fn get_channel(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    Json(channel_response(state.channel.as_ref()))
}

async fn connect_channel(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    info!("Diagnostics: forcing channel connect");
    let (ok, error) = match state.channel.connect().await {
        Ok(ok) => (ok, None),
        Err(e) => {
            warn!("Diagnostics: connect failed: {}", e);
            (false, Some(e.to_string()))
        }
    };
    let code = if ok { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    (
        code,
        Json(ConnectResponse {
            ok,
            error,
            channel: channel_response(state.channel.as_ref()),
        }),
    )
}

async fn get_queue(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    Json(QueueResponse {
        depth: state.queue.len(),
        capacity: state.queue.capacity(),
        dropped: state.queue.dropped(),
    })
}

async fn get_stats(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "connected": state.channel.is_connected(),
        "queue_depth": state.queue.len(),
    }))
}

pub fn create_diagnostics_routes() -> Router<DiagnosticsState> {
    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/stats", get(get_stats))
        .route("/api/channel", get(get_channel))
        .route("/api/channel/connect", post(connect_channel))
        .route("/api/history/queue", get(get_queue))
}
