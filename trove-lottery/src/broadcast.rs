use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use trove_core::{BroadcastPort, RoundSnapshot};

/// In-process fan-out of round snapshots, one channel per watched group
pub struct BroadcastHub {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<RoundSnapshot>>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Start watching a group. Late subscribers recover state via `status`.
    pub fn subscribe(&self, group_id: &str) -> broadcast::Receiver<RoundSnapshot> {
        let mut channels = self.channels.write();
        channels
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, group_id: &str) -> usize {
        self.channels
            .read()
            .get(group_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl BroadcastPort for BroadcastHub {
    fn publish(&self, group_id: &str, snapshot: &RoundSnapshot) -> trove_core::Result<()> {
        let delivered = {
            let channels = self.channels.read();
            match channels.get(group_id) {
                Some(tx) => tx.send(snapshot.clone()).ok(),
                None => None,
            }
        };

        match delivered {
            Some(receivers) => {
                tracing::debug!(
                    "Broadcast {} update for group {} to {} watchers",
                    snapshot.status,
                    group_id,
                    receivers
                );
            }
            None => {
                // nobody is watching; drop the idle channel
                let mut channels = self.channels.write();
                if channels
                    .get(group_id)
                    .map_or(false, |tx| tx.receiver_count() == 0)
                {
                    channels.remove(group_id);
                }
                tracing::debug!("No watchers for group {}", group_id);
            }
        }

        Ok(())
    }
}

/// Publish and swallow failures; a missed update never fails the caller
pub(crate) fn announce(broadcaster: &dyn BroadcastPort, snapshot: &RoundSnapshot) {
    if let Err(e) = broadcaster.publish(&snapshot.group_id, snapshot) {
        tracing::warn!(
            "Failed to broadcast {} update for group {}: {}",
            snapshot.status,
            snapshot.group_id,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::RoundStatus;

    #[tokio::test]
    async fn test_subscribers_receive_in_publish_order() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe("g1");

        let mut countdown = RoundSnapshot::reset("g1");
        countdown.status = RoundStatus::Countdown;
        hub.publish("g1", &RoundSnapshot::reset("g1")).unwrap();
        hub.publish("g1", &countdown).unwrap();

        assert_eq!(rx.recv().await.unwrap().status, RoundStatus::Confirming);
        assert_eq!(rx.recv().await.unwrap().status, RoundStatus::Countdown);
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe("g1");

        hub.publish("g2", &RoundSnapshot::reset("g2")).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_watchers_is_fine() {
        let hub = BroadcastHub::new(8);
        let rx = hub.subscribe("g1");
        drop(rx);

        assert!(hub.publish("g1", &RoundSnapshot::reset("g1")).is_ok());
        assert_eq!(hub.subscriber_count("g1"), 0);
    }
}
