use crate::codec;
use crate::drivers::address::parse_address;
use crate::drivers::traits::{Channel, ChannelHealth, PlcConfig};
use crate::drivers::transport::BlockTransport;
use crate::error::{GatewayError, GatewayResult};
use crate::tags::registry::TagRegistry;
use crate::tags::structures::{FieldType, TagDefinition, TagValue, ValueVariant};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Channel to a Siemens S7 controller over a byte-level transport.
pub struct S7Channel {
    config: PlcConfig,
    transport: Arc<dyn BlockTransport>,
    tags: TagRegistry,
    health: Mutex<ChannelHealth>,
    opened_before: AtomicBool,
    operation_timeout: Duration, // Bound on every transport round-trip
}

impl S7Channel {
    pub fn new(config: PlcConfig, transport: Arc<dyn BlockTransport>) -> Self {
        S7Channel {
            config,
            transport,
            tags: TagRegistry::new(),
            health: Mutex::new(ChannelHealth::default()),
            opened_before: AtomicBool::new(false),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn config(&self) -> &PlcConfig {
        &self.config
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.tags
    }

    fn health_mut(&self) -> MutexGuard<'_, ChannelHealth> {
        self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_good(&self) {
        let mut h = self.health_mut();
        h.is_connected = true;
        h.last_good_utc = Some(Utc::now());
    }

    fn record_error(&self, e: &GatewayError) {
        let mut h = self.health_mut();
        h.is_connected = self.transport.is_open();
        h.last_error_message = Some(e.to_string());
    }

    fn record_connected(&self) {
        let now = Utc::now();
        let reopened = self.opened_before.swap(true, Ordering::SeqCst);
        let mut h = self.health_mut();
        h.is_connected = true;
        if h.first_connect_utc.is_none() {
            h.first_connect_utc = Some(now);
        }
        if reopened {
            h.reconnect_count += 1;
            h.last_reconnect_utc = Some(now);
        }
    }

    /// A round-trip that outlives the operation timeout is a transport error.
    async fn timed<T>(&self, op: impl Future<Output = GatewayResult<T>>) -> GatewayResult<T> {
        match timeout(self.operation_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Transport(format!(
                "operation timed out after {} ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }

    /// Connect if needed; an unreachable controller becomes `NotConnected`.
    async fn ensure_connected(&self) -> GatewayResult<()> {
        if self.connect().await? {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    async fn read_definition(&self, tag: &TagDefinition) -> GatewayResult<ValueVariant> {
        let location = parse_address(&tag.address)?;
        let len = codec::byte_len(tag.field_type, tag.count);
        let buf = self.timed(self.transport.read_bytes(&location, len)).await?;
        if !tag.field_type.is_string() {
            codec::check_len(&buf, len)?;
        }
        Ok(codec::decode_value(tag.field_type, tag.count, location.bit, &buf))
    }

    async fn read_recorded(&self, name: &str) -> GatewayResult<ValueVariant> {
        let tag = self.tags.resolve(name)?;
        let result = async {
            self.ensure_connected().await?;
            self.read_definition(&tag).await
        }
        .await;
        match &result {
            Ok(_) => self.record_good(),
            Err(e) => self.record_error(e),
        }
        result
    }

    /// Batch reads still fail as a whole when the link cannot be opened.
    async fn read_batch(&self, names: &[String]) -> GatewayResult<BTreeMap<String, GatewayResult<ValueVariant>>> {
        if let Err(e) = self.ensure_connected().await {
            self.record_error(&e);
            return Err(e);
        }
        let mut out = BTreeMap::new();
        for name in names {
            let result = self.read_recorded(name).await;
            if let Err(e) = &result {
                warn!("Read of tag '{}' failed: {}", name, e);
            }
            out.insert(name.clone(), result);
        }
        Ok(out)
    }
}

#[async_trait]
impl Channel for S7Channel {
    async fn connect(&self) -> GatewayResult<bool> {
        if self.transport.is_open() {
            return Ok(true);
        }
        match self.timed(self.transport.open()).await {
            Ok(()) => {
                info!("Channel '{}' connected to {}", self.config.name, self.config.endpoint());
                self.record_connected();
                Ok(true)
            }
            Err(e) if e.is_transient() => {
                warn!("Channel '{}' connect to {} failed: {}", self.config.name, self.config.endpoint(), e);
                self.record_error(&e);
                Ok(false)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        if self.transport.is_open() {
            self.transport.close().await;
            info!("Channel '{}' disconnected", self.config.name);
        }
        self.health_mut().is_connected = false;
    }

    fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    fn add_tag(&self, tag: TagDefinition) {
        debug!("Registering tag '{}' at {} ({:?} x{})", tag.name, tag.address, tag.field_type, tag.count);
        self.tags.add(tag);
    }

    fn remove_tag(&self, name: &str) -> bool {
        self.tags.remove(name)
    }

    async fn read_tag(&self, name: &str) -> GatewayResult<ValueVariant> {
        self.read_recorded(name).await
    }

    async fn read_many(&self, names: &[String]) -> GatewayResult<BTreeMap<String, Option<ValueVariant>>> {
        let results = self.read_batch(names).await?;
        Ok(results.into_iter().map(|(name, r)| (name, r.ok())).collect())
    }

    async fn write_tag(&self, name: &str, value: ValueVariant) -> GatewayResult<bool> {
        let tag = self.tags.resolve(name)?;
        let location = parse_address(&tag.address)?;
        let native = codec::coerce(tag.field_type, tag.count, &value).map_err(|reason| {
            GatewayError::Conversion {
                tag: name.to_string(),
                reason,
            }
        })?;

        if let Err(e) = self.ensure_connected().await {
            self.record_error(&e);
            return Ok(false);
        }

        let written = match (tag.field_type, &native) {
            (FieldType::Bit, ValueVariant::Bool(b)) => {
                let mut bit_location = location;
                bit_location.bit = Some(location.bit.unwrap_or(0));
                self.timed(self.transport.write_bit(&bit_location, *b)).await
            }
            _ => {
                let bytes = codec::encode_value(tag.field_type, tag.count, &native).map_err(|e| match e {
                    GatewayError::Conversion { reason, .. } => GatewayError::Conversion {
                        tag: name.to_string(),
                        reason,
                    },
                    other => other,
                })?;
                self.timed(self.transport.write_bytes(&location, &bytes)).await
            }
        };

        match written {
            Ok(()) => {
                self.record_good();
                debug!("Wrote tag '{}' = {:?}", name, native);
                Ok(true)
            }
            Err(e) => {
                warn!("Write of tag '{}' failed: {}", name, e);
                self.record_error(&e);
                Ok(false)
            }
        }
    }

    async fn read_tags_with_quality(&self, names: &[String]) -> GatewayResult<BTreeMap<String, TagValue>> {
        let results = self.read_batch(names).await?;
        Ok(results
            .into_iter()
            .map(|(name, r)| {
                let value = match r {
                    Ok(v) => TagValue::good(v),
                    Err(_) => TagValue::bad(),
                };
                (name, value)
            })
            .collect())
    }

    fn health(&self) -> ChannelHealth {
        let mut snapshot = self.health_mut().clone();
        snapshot.is_connected = self.transport.is_open();
        snapshot
    }
}
