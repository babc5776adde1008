use crate::drivers::traits::{Channel, ChannelHealth, TryRead};
use crate::error::GatewayResult;
use crate::tags::structures::{TagDefinition, TagValue, ValueVariant};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry settings for channel operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Retries in addition to the first attempt.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Fixed delay between attempts (ms).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retry_count() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Wraps any channel with bounded, fixed-delay retries.
///
/// Value-returning operations retry on transient errors; `false` results of
/// boolean operations count as failures too. After the budget is spent the
/// last error is returned unchanged. Teardown is never retried.
pub struct ResilientChannel<C: Channel> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Channel> ResilientChannel<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        ResilientChannel { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn retry<T, F, Fut>(&self, op_name: &str, mut op: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = GatewayResult<T>> + Send,
        T: Send,
    {
        let mut attempts = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempts < self.policy.max_retry_count => {
                    attempts += 1;
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {} ms",
                        op_name,
                        attempts,
                        self.policy.max_retry_count + 1,
                        e,
                        self.policy.retry_delay_ms
                    );
                    sleep(self.policy.delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Like [`Self::retry`], but a `false` result also counts as a failure.
    /// Once the budget is spent, `false` is returned as-is.
    async fn retry_flag<F, Fut>(&self, op_name: &str, mut op: F) -> GatewayResult<bool>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = GatewayResult<bool>> + Send,
    {
        let mut attempts = 0u32;
        loop {
            let failure = match op().await {
                Ok(true) => return Ok(true),
                Ok(false) => None,
                Err(e) if e.is_transient() => Some(e),
                Err(e) => return Err(e),
            };
            if attempts >= self.policy.max_retry_count {
                return match failure {
                    Some(e) => Err(e),
                    None => Ok(false),
                };
            }
            attempts += 1;
            warn!(
                "{} failed (attempt {}/{}). Retrying in {} ms",
                op_name,
                attempts,
                self.policy.max_retry_count + 1,
                self.policy.retry_delay_ms
            );
            sleep(self.policy.delay()).await;
        }
    }
}

#[async_trait]
impl<C: Channel> Channel for ResilientChannel<C> {
    async fn connect(&self) -> GatewayResult<bool> {
        self.retry_flag("connect", || self.inner.connect()).await
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn add_tag(&self, tag: TagDefinition) {
        self.inner.add_tag(tag)
    }

    fn remove_tag(&self, name: &str) -> bool {
        self.inner.remove_tag(name)
    }

    async fn read_tag(&self, name: &str) -> GatewayResult<ValueVariant> {
        self.retry("read_tag", || self.inner.read_tag(name)).await
    }

    async fn read_many(&self, names: &[String]) -> GatewayResult<BTreeMap<String, Option<ValueVariant>>> {
        self.retry("read_many", || self.inner.read_many(names)).await
    }

    async fn write_tag(&self, name: &str, value: ValueVariant) -> GatewayResult<bool> {
        self.retry_flag("write_tag", || self.inner.write_tag(name, value.clone()))
            .await
    }

    /// Retries on a failed outcome rather than on errors.
    async fn try_read_tag(&self, name: &str) -> TryRead {
        let mut attempts = 0u32;
        loop {
            let outcome = self.inner.try_read_tag(name).await;
            if outcome.ok || attempts >= self.policy.max_retry_count {
                return outcome;
            }
            attempts += 1;
            sleep(self.policy.delay()).await;
        }
    }

    async fn read_tags_with_quality(&self, names: &[String]) -> GatewayResult<BTreeMap<String, TagValue>> {
        self.retry("read_tags_with_quality", || self.inner.read_tags_with_quality(names))
            .await
    }

    fn health(&self) -> ChannelHealth {
        self.inner.health()
    }
}
