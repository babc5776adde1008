use crate::error::{GatewayError, GatewayResult};
use crate::tags::structures::{FromValue, TagDefinition, TagValue, ValueVariant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a controller connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlcConfig {
    #[serde(default = "default_plc_name")]
    pub name: String, // Connection name tags refer to
    pub ip: String,   // Controller IP address
    #[serde(default)]
    pub rack: u16,
    #[serde(default = "default_slot")]
    pub slot: u16,
    #[serde(default = "default_cpu")]
    pub cpu: String, // e.g. "S71200", "S71500"
    #[serde(default)]
    pub simulate: bool, // Use the in-process memory transport
    #[serde(default)]
    pub simulated_blocks: Vec<SimulatedBlock>,
}

/// Data block to allocate when running against simulated memory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedBlock {
    pub number: u16,
    pub size: usize,
}

fn default_plc_name() -> String {
    "plc1".to_string()
}

fn default_slot() -> u16 {
    1
}

fn default_cpu() -> String {
    "S71500".to_string()
}

impl PlcConfig {
    pub fn endpoint(&self) -> String {
        format!("{} ({} rack {} slot {})", self.ip, self.cpu, self.rack, self.slot)
    }
}

/// Connection health recorded by a channel on connect/read/write outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub is_connected: bool,
    pub first_connect_utc: Option<DateTime<Utc>>,
    pub last_good_utc: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub reconnect_count: u64,
    pub last_reconnect_utc: Option<DateTime<Utc>>,
}

impl ChannelHealth {
    /// Seconds since the first successful connect, 0 if never connected.
    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.first_connect_utc
            .map(|t| (now - t).num_seconds().max(0))
            .unwrap_or(0)
    }
}

/// Result of the non-failing read variant.
#[derive(Debug, Clone, PartialEq)]
pub struct TryRead {
    pub ok: bool,
    pub value: Option<ValueVariant>,
    pub error: Option<String>,
}

impl TryRead {
    pub fn success(value: ValueVariant) -> Self {
        TryRead {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(error: &GatewayError) -> Self {
        TryRead {
            ok: false,
            value: None,
            error: Some(error.to_string()),
        }
    }
}

/// Contract every controller channel implements.
///
/// Batch reads are best-effort: one outcome per requested name, `None` for
/// tags that failed. Batch results are keyed (and therefore ordered) by name.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Open the link if needed. Returns whether it is open afterwards.
    async fn connect(&self) -> GatewayResult<bool>;

    /// Close the link. Never fails.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Add or replace a tag definition.
    fn add_tag(&self, tag: TagDefinition);

    /// Returns whether the tag existed.
    fn remove_tag(&self, name: &str) -> bool;

    /// Read one tag in its native representation.
    async fn read_tag(&self, name: &str) -> GatewayResult<ValueVariant>;

    async fn read_many(&self, names: &[String]) -> GatewayResult<BTreeMap<String, Option<ValueVariant>>>;

    /// Coerce, encode and write. Returns whether the round-trip succeeded.
    async fn write_tag(&self, name: &str, value: ValueVariant) -> GatewayResult<bool>;

    async fn try_read_tag(&self, name: &str) -> TryRead {
        match self.read_tag(name).await {
            Ok(value) => TryRead::success(value),
            Err(e) => TryRead::failure(&e),
        }
    }

    async fn read_tags_with_quality(&self, names: &[String]) -> GatewayResult<BTreeMap<String, TagValue>>;

    fn health(&self) -> ChannelHealth;
}

/// Typed reads on top of [`Channel::read_tag`].
#[async_trait]
pub trait ChannelExt: Channel {
    async fn read_tag_as<T: FromValue + Send>(&self, name: &str) -> GatewayResult<T> {
        let value = self.read_tag(name).await?;
        let shown = format!("{:?}", value);
        T::from_value(value).ok_or_else(|| GatewayError::Conversion {
            tag: name.to_string(),
            reason: format!("{} does not convert to {}", shown, std::any::type_name::<T>()),
        })
    }
}

impl<C: Channel + ?Sized> ChannelExt for C {}
