//! Lottery round engine for rotating savings groups
//!
//! Members confirm they are in, the engine fixes a weighted payout order up
//! front, then reveals it in two timed phases (countdown, spin) while
//! broadcasting each step to anyone watching the group.

pub mod broadcast;
pub mod commitment;
pub mod draw;
pub mod engine;
pub mod error;
pub mod practice;
pub mod scheduler;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use broadcast::BroadcastHub;
pub use commitment::DrawCommitment;
pub use draw::{weighted_draw, Entrant};
pub use engine::{Collaborators, LotteryEngine};
pub use error::{LotteryError, Result};
pub use practice::{PracticeRegistry, PracticeSession, PracticeSimulator};
pub use scheduler::{RoundScheduler, ScanReport};

use std::sync::Arc;
use trove_core::{GroupStore, LotteryConfig, NotificationStore, SqliteRoundStore, Storage};

/// Wire an engine to the SQLite adapters in `storage` and an in-process hub
pub fn local_engine(storage: Arc<Storage>, hub: Arc<BroadcastHub>, config: LotteryConfig) -> LotteryEngine {
    LotteryEngine::new(
        Collaborators {
            store: Arc::new(SqliteRoundStore::new(storage.clone())),
            members: Arc::new(GroupStore::new(storage.clone())),
            notifier: Arc::new(NotificationStore::new(storage)),
            broadcaster: hub,
        },
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::{GroupMember, RoundStatus};

    #[tokio::test]
    async fn test_local_engine_round_trip() {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let groups = GroupStore::new(storage.clone());
        let notifications = NotificationStore::new(storage.clone());
        let hub = Arc::new(BroadcastHub::new(16));

        let group = groups.create_group("Family", "mum", 1).await.unwrap();
        groups
            .add_member(
                &group.id,
                &GroupMember {
                    member_id: "mum".into(),
                    display_name: Some("Mum".into()),
                    slots: Some(2),
                },
            )
            .await
            .unwrap();

        let config = LotteryConfig {
            countdown: std::time::Duration::ZERO,
            spin_duration: std::time::Duration::ZERO,
            ..Default::default()
        };
        let engine = local_engine(storage, hub, config);

        engine.confirm_participation("mum", &group.id).await.unwrap();
        engine.start_selection(&group.id).await.unwrap();
        engine.wait_for_reveals().await;

        let status = engine.status(&group.id).await.unwrap().unwrap();
        assert_eq!(status.status, RoundStatus::Completed);
        assert_eq!(status.payout_order, vec!["mum", "mum"]);
        assert_eq!(status.selected_name.as_deref(), Some("Mum"));

        // open + start land in the inbox; no join notice for the only member
        let inbox = notifications.list_for_member("mum").await.unwrap();
        assert_eq!(inbox.len(), 2);
    }
}
