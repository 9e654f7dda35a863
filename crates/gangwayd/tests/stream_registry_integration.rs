//! Integration tests for the stream registry.
//!
//! These verify the channel-sharing invariants as a complete system:
//! one engine stream per (container, kind) under concurrent subscribe
//! bursts, destroy-on-last-leave, ordered fan-out without backlog
//! replay, and full disconnect sweeps.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gangway_core::{ContainerId, ObserverId};
use gangwayd::streams::{spawn_stream_registry, ChannelKey, StreamEvent, StreamRegistryHandle};
use gangwayd::testing::MockEngine;
use tokio::sync::mpsc;
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const POLL_ATTEMPTS: usize = 200;

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..POLL_ATTEMPTS {
        if cond() {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    panic!("condition not reached in time");
}

fn chunk_data(event: StreamEvent) -> String {
    match event {
        StreamEvent::Chunk { data, .. } => data,
    }
}

async fn subscribe(
    registry: &StreamRegistryHandle,
    key: &ChannelKey,
    observer: &str,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(64);
    registry
        .subscribe(key.clone(), ObserverId::new(observer), tx)
        .await
        .expect("subscribe");
    rx
}

#[tokio::test]
async fn concurrent_subscribe_burst_opens_one_engine_stream() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let key = ChannelKey::logs(ContainerId::new("burst"));

    let mut receivers = Vec::new();
    let mut joins = Vec::new();
    for i in 0..20 {
        let registry = registry.clone();
        let key = key.clone();
        joins.push(tokio::spawn(async move {
            let (tx, rx) = mpsc::channel(64);
            registry
                .subscribe(key, ObserverId::new(format!("observer-{i}")), tx)
                .await
                .expect("subscribe");
            rx
        }));
    }
    for join in joins {
        receivers.push(join.await.expect("join"));
    }

    assert_eq!(registry.channel_count().await.unwrap(), 1);
    assert_eq!(registry.member_count(key.clone()).await.unwrap(), Some(20));

    // Only one engine stream ever opened for the shared channel.
    wait_until(|| engine.calls.log_streams.load(Ordering::SeqCst) >= 1).await;
    assert_eq!(engine.calls.log_streams.load(Ordering::SeqCst), 1);

    drop(receivers);
}

#[tokio::test]
async fn last_unsubscribe_closes_the_engine_stream() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let key = ChannelKey::stats(ContainerId::new("c1"));

    let _rx1 = subscribe(&registry, &key, "observer-1").await;
    let _rx2 = subscribe(&registry, &key, "observer-2").await;

    wait_until(|| engine.calls.stats_streams.load(Ordering::SeqCst) == 1).await;
    let feed = engine.take_feed("c1", "stats").expect("feed");
    assert!(feed.push("{}"));

    registry
        .unsubscribe(key.clone(), ObserverId::new("observer-1"))
        .await;
    assert_eq!(registry.member_count(key.clone()).await.unwrap(), Some(1));
    assert_eq!(registry.channel_count().await.unwrap(), 1);

    registry
        .unsubscribe(key.clone(), ObserverId::new("observer-2"))
        .await;
    assert_eq!(registry.member_count(key.clone()).await.unwrap(), None);
    assert_eq!(registry.channel_count().await.unwrap(), 0);

    // The pump dropped the engine stream once cancelled.
    wait_until(|| feed.is_closed()).await;
}

#[tokio::test]
async fn chunks_fan_out_in_order_without_backlog_replay() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let key = ChannelKey::logs(ContainerId::new("c1"));

    let mut rx1 = subscribe(&registry, &key, "observer-1").await;
    let mut rx2 = subscribe(&registry, &key, "observer-2").await;

    wait_until(|| engine.calls.log_streams.load(Ordering::SeqCst) == 1).await;
    let feed = engine.take_feed("c1", "logs").expect("feed");

    feed.push("line-1\n");
    feed.push("line-2\n");

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(chunk_data(rx.recv().await.unwrap()), "line-1\n");
        assert_eq!(chunk_data(rx.recv().await.unwrap()), "line-2\n");
    }

    // A member joining now must not see the chunks delivered above.
    let mut rx3 = subscribe(&registry, &key, "observer-3").await;
    feed.push("line-3\n");

    assert_eq!(chunk_data(rx3.recv().await.unwrap()), "line-3\n");
    assert_eq!(chunk_data(rx1.recv().await.unwrap()), "line-3\n");
    assert_eq!(chunk_data(rx2.recv().await.unwrap()), "line-3\n");
}

#[tokio::test]
async fn overflowing_observer_is_removed_not_stalled() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let key = ChannelKey::logs(ContainerId::new("c1"));

    // One-slot queue that nobody drains.
    let (slow_tx, _slow_rx) = mpsc::channel(1);
    registry
        .subscribe(key.clone(), ObserverId::new("observer-slow"), slow_tx)
        .await
        .expect("subscribe");
    let mut fast_rx = subscribe(&registry, &key, "observer-fast").await;

    wait_until(|| engine.calls.log_streams.load(Ordering::SeqCst) == 1).await;
    let feed = engine.take_feed("c1", "logs").expect("feed");

    feed.push("line-1\n");
    feed.push("line-2\n");

    // The healthy member saw every chunk; the backed-up one was
    // unsubscribed when its queue could not take line-2.
    assert_eq!(chunk_data(fast_rx.recv().await.unwrap()), "line-1\n");
    assert_eq!(chunk_data(fast_rx.recv().await.unwrap()), "line-2\n");
    assert_eq!(registry.member_count(key.clone()).await.unwrap(), Some(1));
}

#[tokio::test]
async fn disconnect_sweeps_every_channel_the_observer_joined() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let observer = ObserverId::new("observer-1");

    let keys = [
        ChannelKey::logs(ContainerId::new("a")),
        ChannelKey::stats(ContainerId::new("a")),
        ChannelKey::logs(ContainerId::new("b")),
    ];
    let mut receivers = Vec::new();
    for key in &keys {
        let (tx, rx) = mpsc::channel(64);
        registry
            .subscribe(key.clone(), observer.clone(), tx)
            .await
            .expect("subscribe");
        receivers.push(rx);
    }
    // A second observer keeps one channel alive through the sweep.
    let _other = subscribe(&registry, &keys[2], "observer-2").await;

    assert_eq!(registry.channel_count().await.unwrap(), 3);

    registry.disconnect(observer).await;

    assert_eq!(registry.channel_count().await.unwrap(), 1);
    assert_eq!(registry.member_count(keys[0].clone()).await.unwrap(), None);
    assert_eq!(registry.member_count(keys[1].clone()).await.unwrap(), None);
    assert_eq!(
        registry.member_count(keys[2].clone()).await.unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn resubscribe_after_stream_failure_opens_a_fresh_stream() {
    let engine = Arc::new(MockEngine::new());
    let registry = spawn_stream_registry(engine.clone());
    let key = ChannelKey::logs(ContainerId::new("c1"));

    let _rx1 = subscribe(&registry, &key, "observer-1").await;
    wait_until(|| engine.calls.log_streams.load(Ordering::SeqCst) == 1).await;

    // Fail the stream from the engine side.
    let feed = engine.take_feed("c1", "logs").expect("feed");
    feed.fail("engine went away");

    // Registration is removed, so a new subscribe opens stream number two.
    let mut cleared = false;
    for _ in 0..POLL_ATTEMPTS {
        if registry.channel_count().await.unwrap() == 0 {
            cleared = true;
            break;
        }
        sleep(POLL_INTERVAL).await;
    }
    assert!(cleared, "failed channel registration was not removed");

    let _rx2 = subscribe(&registry, &key, "observer-1").await;
    wait_until(|| engine.calls.log_streams.load(Ordering::SeqCst) == 2).await;
}
