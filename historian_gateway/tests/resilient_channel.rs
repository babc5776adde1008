mod test_utils;

use historian_gateway::drivers::traits::Channel;
use historian_gateway::drivers::{ResilientChannel, RetryPolicy};
use historian_gateway::error::GatewayError;
use historian_gateway::tags::structures::ValueVariant;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use test_utils::{channel_with_tags, memory_transport, FailureKind, FlakyChannel};
use tokio::time::{Duration, Instant};

fn policy(max_retry_count: u32, retry_delay_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_retry_count,
        retry_delay_ms,
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_when_failures_fit_the_budget() {
    for max in 0..4u32 {
        for failures in 0..=max {
            let channel = ResilientChannel::new(FlakyChannel::new(failures), policy(max, 100));
            let start = Instant::now();

            let value = channel.read_tag("t").await;
            assert_eq!(value, Ok(ValueVariant::Int(42)), "max={} failures={}", max, failures);
            assert_eq!(channel.inner().calls(), failures as usize + 1);
            assert!(start.elapsed() >= Duration::from_millis(100) * failures);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn exceeding_the_budget_returns_the_last_error() {
    let max = 2;
    let channel = ResilientChannel::new(FlakyChannel::new(max + 1), policy(max, 100));
    let start = Instant::now();

    let err = channel.read_tag("pump").await.unwrap_err();
    assert_eq!(err, GatewayError::Transport("flaky read of pump".to_string()));
    assert_eq!(channel.inner().calls(), max as usize + 1);
    assert!(start.elapsed() >= Duration::from_millis(100) * max);
}

#[tokio::test(start_paused = true)]
async fn non_transient_errors_are_not_retried() {
    let channel = ResilientChannel::new(FlakyChannel::with_kind(1, FailureKind::TagNotFound), policy(3, 100));

    let err = channel.read_tag("ghost").await.unwrap_err();
    assert_eq!(err, GatewayError::TagNotFound("ghost".to_string()));
    assert_eq!(channel.inner().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn false_results_are_retried() {
    let channel = ResilientChannel::new(FlakyChannel::new(1), policy(1, 50));
    assert!(channel.connect().await.unwrap());
    assert_eq!(channel.inner().calls(), 2);

    let channel = ResilientChannel::new(FlakyChannel::new(2), policy(1, 50));
    assert!(!channel.write_tag("t", ValueVariant::Int(1)).await.unwrap());
    assert_eq!(channel.inner().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn try_read_retries_failed_outcomes() {
    let channel = ResilientChannel::new(FlakyChannel::new(1), policy(1, 10));
    let outcome = channel.try_read_tag("t").await;
    assert!(outcome.ok);
    assert_eq!(channel.inner().calls(), 2);

    let channel = ResilientChannel::new(FlakyChannel::new(5), policy(2, 10));
    let outcome = channel.try_read_tag("t").await;
    assert!(!outcome.ok);
    assert!(outcome.error.is_some());
    assert_eq!(channel.inner().calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_reads_are_retried() {
    let channel = ResilientChannel::new(FlakyChannel::new(1), policy(1, 10));
    let names = vec!["a".to_string(), "b".to_string()];

    let values = channel.read_many(&names).await.unwrap();
    assert_eq!(values.len(), 2);

    let channel = ResilientChannel::new(FlakyChannel::new(1), policy(1, 10));
    let quality = channel.read_tags_with_quality(&names).await.unwrap();
    assert_eq!(quality.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_passed_through_once() {
    let channel = ResilientChannel::new(FlakyChannel::new(10), policy(3, 10));
    channel.disconnect().await;
    assert_eq!(channel.inner().disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(channel.inner().calls(), 0);
}

#[tokio::test]
async fn injected_transport_failure_is_absorbed() {
    let transport = memory_transport();
    let channel = ResilientChannel::new(channel_with_tags(Arc::clone(&transport)), policy(1, 1));
    assert!(channel.connect().await.unwrap());

    transport.fail_next(1);
    assert_eq!(channel.read_tag("tInt").await, Ok(ValueVariant::Int(0)));
    assert_eq!(transport.read_count(), 2);
}

#[test]
fn default_policy() {
    let p = RetryPolicy::default();
    assert_eq!(p.max_retry_count, 1);
    assert_eq!(p.delay(), Duration::from_millis(100));
}
