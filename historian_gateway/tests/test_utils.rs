#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use historian_gateway::config::settings::{Settings, TagConfig};
use historian_gateway::drivers::address::parse_address;
use historian_gateway::drivers::traits::{Channel, ChannelHealth, PlcConfig};
use historian_gateway::drivers::transport::MemoryTransport;
use historian_gateway::drivers::S7Channel;
use historian_gateway::error::{GatewayError, GatewayResult};
use historian_gateway::history::SamplePoint;
use historian_gateway::tags::structures::{DataType, FieldType, Quality, TagDefinition, TagValue, ValueVariant};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

pub const DB: u16 = 1;

pub fn plc_config() -> PlcConfig {
    PlcConfig {
        name: "plc1".to_string(),
        ip: "127.0.0.1".to_string(),
        rack: 0,
        slot: 1,
        cpu: "S71500".to_string(),
        simulate: true,
        simulated_blocks: vec![],
    }
}

/// Simulated controller with one 512 byte data block.
pub fn memory_transport() -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::new().with_block(DB, 512))
}

/// Tag layout used across the channel tests.
pub fn standard_tags() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new("tBool", "DB1.DBX0.3", FieldType::Bit, 1),
        TagDefinition::new("tInt", "DB1.DBW2", FieldType::Int, 1),
        TagDefinition::new("tReal", "DB1.DBD4", FieldType::Real, 1),
        TagDefinition::new("tString", "DB1.10", FieldType::String, 20),
        TagDefinition::new("tWString", "DB1.40", FieldType::Wstring, 8),
        TagDefinition::new("tDate", "DB1.DBW60", FieldType::Date, 1),
        TagDefinition::new("tArray", "DB1.DBW70", FieldType::Int, 3),
    ]
}

pub fn channel_with_tags(transport: Arc<MemoryTransport>) -> S7Channel {
    let channel = S7Channel::new(plc_config(), transport);
    for tag in standard_tags() {
        channel.add_tag(tag);
    }
    channel
}

/// Write raw bytes at a tag address.
pub fn poke(transport: &MemoryTransport, address: &str, data: &[u8]) {
    let location = parse_address(address).expect("valid address");
    transport.poke(&location, data).expect("poke");
}

pub fn peek(transport: &MemoryTransport, address: &str, len: usize) -> Vec<u8> {
    let location = parse_address(address).expect("valid address");
    transport.peek(&location, len).expect("peek")
}

pub fn utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("valid timestamp")
}

pub fn sample_point(tag: &str, value: f64, at: DateTime<Utc>) -> SamplePoint {
    SamplePoint::new(at, tag, None, DataType::Float, &ValueVariant::Float(value), Quality::Good)
}

pub fn tag_config(name: &str, address: &str, field_type: FieldType) -> TagConfig {
    TagConfig {
        name: name.to_string(),
        address: address.to_string(),
        field_type,
        count: 1,
        connection: "plc1".to_string(),
        tag_id: None,
        archive: None,
    }
}

/// Settings for an in-memory pipeline; history goes to `database_path`.
pub fn pipeline_settings(database_path: &str, tags: Vec<TagConfig>) -> Settings {
    let mut plc = plc_config();
    plc.simulated_blocks = vec![historian_gateway::drivers::traits::SimulatedBlock {
        number: DB,
        size: 512,
    }];
    Settings {
        log_level: "debug".to_string(),
        plc,
        communication: Default::default(),
        sampling: Default::default(),
        runtime: Default::default(),
        history: historian_gateway::history::HistoryConfig {
            database_path: database_path.to_string(),
            ..Default::default()
        },
        diagnostics: Default::default(),
        tags,
    }
}

/// How a [`FlakyChannel`] fails while it still has failures left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureKind {
    Transport,
    TagNotFound,
}

/// Channel that fails a fixed number of times before succeeding.
pub struct FlakyChannel {
    failures_left: AtomicU32,
    kind: FailureKind,
    pub calls: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FlakyChannel {
    pub fn new(failures: u32) -> Self {
        Self::with_kind(failures, FailureKind::Transport)
    }

    pub fn with_kind(failures: u32, kind: FailureKind) -> Self {
        FlakyChannel {
            failures_left: AtomicU32::new(failures),
            kind,
            calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Consume one failure if any are left.
    fn attempt(&self, name: &str) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !failed {
            return Ok(());
        }
        Err(match self.kind {
            FailureKind::Transport => GatewayError::Transport(format!("flaky read of {}", name)),
            FailureKind::TagNotFound => GatewayError::TagNotFound(name.to_string()),
        })
    }
}

#[async_trait]
impl Channel for FlakyChannel {
    async fn connect(&self) -> GatewayResult<bool> {
        Ok(self.attempt("connect").is_ok())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn add_tag(&self, _tag: TagDefinition) {}

    fn remove_tag(&self, _name: &str) -> bool {
        false
    }

    async fn read_tag(&self, name: &str) -> GatewayResult<ValueVariant> {
        self.attempt(name)?;
        Ok(ValueVariant::Int(42))
    }

    async fn read_many(&self, names: &[String]) -> GatewayResult<BTreeMap<String, Option<ValueVariant>>> {
        self.attempt("batch")?;
        Ok(names.iter().map(|n| (n.clone(), Some(ValueVariant::Int(42)))).collect())
    }

    async fn write_tag(&self, name: &str, _value: ValueVariant) -> GatewayResult<bool> {
        Ok(self.attempt(name).is_ok())
    }

    async fn read_tags_with_quality(&self, names: &[String]) -> GatewayResult<BTreeMap<String, TagValue>> {
        self.attempt("batch")?;
        Ok(names
            .iter()
            .map(|n| (n.clone(), TagValue::good(ValueVariant::Int(42))))
            .collect())
    }

    fn health(&self) -> ChannelHealth {
        ChannelHealth::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for_condition<F>(mut condition: F, timeout: Duration, check_interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(check_interval).await;
    }
    condition()
}
