use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use huddle_core::{BridgeApi, BridgeError, BridgePayload, ChatEvent};
use huddle_rooms::Broadcaster;

/// Timing knobs for the poll loop.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Long-poll window handed to the bridge fetch.
    pub long_poll: Duration,
    /// Backoff when another consumer holds the pull session.
    pub conflict_backoff: Duration,
    /// Backoff for every other fetch/processing error.
    pub error_backoff: Duration,
    /// Idle delay after every cycle, bounding the request rate.
    pub idle_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            long_poll: Duration::from_secs(30),
            conflict_backoff: Duration::from_secs(5),
            error_backoff: Duration::from_secs(2),
            idle_delay: Duration::from_millis(500),
        }
    }
}

/// Pulls messages from the external bridge and fans them out into the one
/// configured bridge room.
///
/// Sole owner of the consumption cursor: the highest update id seen so far,
/// strictly non-decreasing for the process lifetime. Each fetch asks for
/// `cursor + 1`, so a message is consumed at most once per process run even
/// when consecutive long polls overlap.
pub struct BridgePoller {
    api: Arc<dyn BridgeApi>,
    broadcaster: Broadcaster,
    room: String,
    config: PollerConfig,
    cursor: i64,
}

impl BridgePoller {
    pub fn new(
        api: Arc<dyn BridgeApi>,
        broadcaster: Broadcaster,
        room: impl Into<String>,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            broadcaster,
            room: room.into(),
            config,
            cursor: 0,
        }
    }

    /// Highest update id consumed so far.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// One polling cycle: best-effort push disable, long-poll fetch at
    /// cursor + 1, then per update in arrival order a monotonic cursor
    /// advance and a broadcast to all members of the bridge room. Returns
    /// how many updates became room events. On error the cursor is left
    /// where it was.
    pub async fn poll_once(&mut self) -> Result<usize, BridgeError> {
        if let Err(e) = self.api.disable_push().await {
            tracing::debug!(error = %e, "push disable failed, continuing with pull");
        }

        let updates = self
            .api
            .fetch_updates(self.cursor + 1, self.config.long_poll)
            .await?;

        let mut delivered = 0;
        for update in updates {
            // Monotonic advance: never move backward on an out-of-order batch.
            self.cursor = self.cursor.max(update.id);

            let event = match update.payload {
                BridgePayload::Text(text) => ChatEvent::Message {
                    id: Some(format!("tg-{}", update.id)),
                    text,
                    sender: Some(update.sender),
                },
                BridgePayload::Photo { resource_id } => ChatEvent::Image {
                    id: Some(format!("tg-{}", update.id)),
                    url: format!("/bridge_image/{resource_id}"),
                    sender: Some(update.sender),
                },
                BridgePayload::Unsupported => continue,
            };
            self.broadcaster.deliver(&self.room, &event, None);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Run the poll loop until `cancel` fires. Errors never end the loop:
    /// conflicts back off longer than the rest, and every cycle ends with
    /// the idle delay. Cancellation interrupts both the in-flight fetch and
    /// any sleep.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(room = %self.room, "bridge poller started");
            loop {
                let backoff = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.poll_once() => match result {
                        Ok(0) => None,
                        Ok(count) => {
                            tracing::debug!(count, cursor = self.cursor, "relayed bridge updates");
                            None
                        }
                        Err(e) if e.is_conflict() => {
                            tracing::warn!(error = %e, "bridge pull session contested");
                            Some(self.config.conflict_backoff)
                        }
                        Err(e) => {
                            tracing::warn!(kind = e.error_kind(), error = %e, "bridge poll failed");
                            Some(self.config.error_backoff)
                        }
                    },
                };

                let delay = backoff.map_or(self.config.idle_delay, |b| b + self.config.idle_delay);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            tracing::info!(cursor = self.cursor, "bridge poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;
    use huddle_rooms::RoomRegistry;
    use serde_json::Value;

    const ROOM: &str = "lounge";

    fn setup() -> (Arc<MockBridge>, Arc<RoomRegistry>, BridgePoller) {
        let mock = Arc::new(MockBridge::new());
        let registry = Arc::new(RoomRegistry::default());
        let poller = BridgePoller::new(
            Arc::clone(&mock) as Arc<dyn BridgeApi>,
            Broadcaster::new(Arc::clone(&registry)),
            ROOM,
            PollerConfig::default(),
        );
        (mock, registry, poller)
    }

    fn frame(raw: String) -> Value {
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn batch_is_broadcast_in_order_and_cursor_lands_on_max() {
        let (mock, registry, mut poller) = setup();
        let (_a, mut alice_rx) = registry.join(ROOM, "alice");
        let (_b, mut bob_rx) = registry.join(ROOM, "bob");

        mock.script_fetch(Ok(vec![
            MockBridge::text_update(101, "Hima", "first"),
            MockBridge::text_update(103, "Hima", "second"),
        ]));

        let delivered = poller.poll_once().await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(poller.cursor(), 103);

        // Every member of the bridge room gets both, ascending.
        for rx in [&mut alice_rx, &mut bob_rx] {
            let first = frame(rx.try_recv().unwrap());
            let second = frame(rx.try_recv().unwrap());
            assert_eq!(first["id"], "tg-101");
            assert_eq!(first["text"], "first");
            assert_eq!(first["sender"], "Hima");
            assert_eq!(second["id"], "tg-103");
            assert!(rx.try_recv().is_err());
        }

        // The next fetch starts right after the consumed maximum.
        poller.poll_once().await.unwrap();
        assert_eq!(mock.offsets(), vec![1, 104]);
    }

    #[tokio::test]
    async fn out_of_order_batch_never_moves_the_cursor_backward() {
        let (mock, _registry, mut poller) = setup();
        mock.script_fetch(Ok(vec![
            MockBridge::text_update(103, "Hima", "late"),
            MockBridge::text_update(101, "Hima", "early"),
        ]));

        poller.poll_once().await.unwrap();
        assert_eq!(poller.cursor(), 103);
    }

    #[tokio::test]
    async fn failed_cycle_leaves_the_cursor_untouched() {
        let (mock, _registry, mut poller) = setup();
        mock.script_fetch(Ok(vec![MockBridge::text_update(101, "Hima", "ok")]));
        mock.script_fetch(Err(BridgeError::Network("down".into())));

        poller.poll_once().await.unwrap();
        assert_eq!(poller.cursor(), 101);

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor(), 101);

        // Retry re-requests the same window.
        poller.poll_once().await.unwrap();
        assert_eq!(mock.offsets(), vec![1, 102, 102]);
    }

    #[tokio::test]
    async fn unsupported_updates_advance_the_cursor_without_events() {
        let (mock, registry, mut poller) = setup();
        let (_a, mut rx) = registry.join(ROOM, "alice");

        mock.script_fetch(Ok(vec![
            MockBridge::unsupported_update(200),
            MockBridge::text_update(201, "Hima", "kept"),
        ]));

        let delivered = poller.poll_once().await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(poller.cursor(), 201);

        let only = frame(rx.try_recv().unwrap());
        assert_eq!(only["id"], "tg-201");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn photo_update_becomes_a_proxied_image_event() {
        let (mock, registry, mut poller) = setup();
        let (_a, mut rx) = registry.join(ROOM, "alice");

        mock.script_fetch(Ok(vec![MockBridge::photo_update(300, "Hima", "file-abc")]));
        poller.poll_once().await.unwrap();

        let event = frame(rx.try_recv().unwrap());
        assert_eq!(event["type"], "image");
        assert_eq!(event["id"], "tg-300");
        assert_eq!(event["url"], "/bridge_image/file-abc");
        assert_eq!(event["sender"], "Hima");
    }

    #[tokio::test]
    async fn each_cycle_retries_the_push_disable() {
        let (mock, _registry, mut poller) = setup();
        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        assert_eq!(mock.push_disables(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_backs_off_but_does_not_kill_the_loop() {
        let (mock, _registry, poller) = setup();
        mock.script_fetch(Err(BridgeError::Conflict("other consumer".into())));
        mock.script_fetch(Ok(vec![]));

        let cancel = CancellationToken::new();
        let handle = poller.spawn(cancel.clone());

        // Paused time auto-advances through the backoff; the loop must keep
        // fetching after the conflict cycle.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if mock.offsets().len() >= 3 {
                break;
            }
        }
        assert!(mock.offsets().len() >= 3, "loop stalled after conflict");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_idle_sleep() {
        let (_mock, _registry, poller) = setup();
        let cancel = CancellationToken::new();
        let handle = poller.spawn(cancel.clone());

        // Give the loop a moment to reach its first sleep, then cancel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("poller did not unwind promptly")
            .unwrap();
    }
}
