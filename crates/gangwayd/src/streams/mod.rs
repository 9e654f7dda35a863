//! Stream registry using the actor pattern.
//!
//! Deduplicates engine streams and fans them out to observers. One
//! channel exists per (container, kind); the first subscriber creates
//! it, later subscribers share it, and the last leave destroys it and
//! closes the engine stream.
//!
//! ```text
//! connection handlers ──StreamCommand──▶ StreamActor ──try_send──▶ observer queues
//!                                            ▲
//!                                            │ Chunk / StreamEnded
//!                                        pump tasks (one per channel,
//!                                        each owning one engine stream)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::ContainerEngine;

mod actor;
mod commands;
mod handle;

pub use actor::StreamActor;
pub use commands::{ChannelKey, StreamCommand, StreamError, StreamEvent, StreamKind};
pub use handle::StreamRegistryHandle;

/// Command channel buffer. Sized for pump chunk traffic, not just
/// subscribe/unsubscribe control messages.
const COMMAND_BUFFER: usize = 256;

/// Spawns the stream actor and returns a handle for interaction.
pub fn spawn_stream_registry(engine: Arc<dyn ContainerEngine>) -> StreamRegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = StreamActor::new(cmd_rx, cmd_tx.clone(), engine);
    tokio::spawn(actor.run());

    StreamRegistryHandle::new(cmd_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;
    use gangway_core::{ContainerId, ObserverId};
    use std::time::Duration;

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn wait_for_async<F, Fut>(cond: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn second_subscriber_shares_the_engine_stream() {
        let engine = Arc::new(MockEngine::new());
        let registry = spawn_stream_registry(engine.clone());
        let key = ChannelKey::logs(ContainerId::new("c1"));

        let (tx1, rx1) = mpsc::channel(16);
        let (tx2, rx2) = mpsc::channel(16);
        registry
            .subscribe(key.clone(), ObserverId::new("observer-1"), tx1)
            .await
            .unwrap();
        registry
            .subscribe(key.clone(), ObserverId::new("observer-2"), tx2)
            .await
            .unwrap();

        // Both subscribes are processed; one channel, two members.
        assert_eq!(registry.channel_count().await.unwrap(), 1);
        assert_eq!(registry.member_count(key).await.unwrap(), Some(2));

        // Exactly one engine stream was opened for the shared channel.
        wait_for(|| {
            engine
                .calls
                .log_streams
                .load(std::sync::atomic::Ordering::SeqCst)
                >= 1
        })
        .await;
        assert_eq!(
            engine
                .calls
                .log_streams
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );

        drop(rx1);
        drop(rx2);
    }

    #[tokio::test]
    async fn last_leave_destroys_the_channel() {
        let engine = Arc::new(MockEngine::new());
        let registry = spawn_stream_registry(engine.clone());
        let key = ChannelKey::stats(ContainerId::new("c1"));
        let observer = ObserverId::new("observer-1");

        let (tx, _rx) = mpsc::channel(16);
        registry
            .subscribe(key.clone(), observer.clone(), tx)
            .await
            .unwrap();
        assert_eq!(registry.channel_count().await.unwrap(), 1);

        registry.unsubscribe(key.clone(), observer).await;

        // Commands are processed in order, so the counts below observe
        // the unsubscribe.
        assert_eq!(registry.member_count(key).await.unwrap(), None);
        assert_eq!(registry.channel_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_stream_removes_registration_for_a_clean_retry() {
        let engine = Arc::new(MockEngine::new());
        engine.fail_op("stats");
        let registry = spawn_stream_registry(engine.clone());
        let key = ChannelKey::stats(ContainerId::new("c1"));

        let (tx, _rx) = mpsc::channel(16);
        registry
            .subscribe(key.clone(), ObserverId::new("observer-1"), tx)
            .await
            .unwrap();

        // The pump fails to open the engine stream and the registration
        // is swept, so a later subscribe starts from scratch.
        let registry2 = registry.clone();
        wait_for_async(move || {
            let registry = registry2.clone();
            async move { registry.channel_count().await.unwrap() == 0 }
        })
        .await;
    }
}
