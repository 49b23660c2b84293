//! Shared fixtures for the engine, practice and scheduler tests.

use crate::broadcast::BroadcastHub;
use crate::engine::{Collaborators, LotteryEngine};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use trove_core::{
    BroadcastPort, Confirmation, GroupInfo, GroupMember, GroupStore, LotteryConfig, LotteryRound,
    Notification, NotificationCategory, NotificationPort, RoundSnapshot, RoundStatus, RoundStore,
    SqliteRoundStore, Storage, TroveError,
};
use uuid::Uuid;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn for_category(&self, category: NotificationCategory) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.category == category)
            .cloned()
            .collect()
    }

    pub fn count(&self, category: NotificationCategory) -> usize {
        self.for_category(category).len()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> trove_core::Result<()> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Side-effect collaborator that always fails
pub struct Unreachable;

#[async_trait]
impl NotificationPort for Unreachable {
    async fn notify(&self, _notification: Notification) -> trove_core::Result<()> {
        Err(TroveError::notification("push gateway unreachable"))
    }
}

impl BroadcastPort for Unreachable {
    fn publish(&self, _group_id: &str, _snapshot: &RoundSnapshot) -> trove_core::Result<()> {
        Err(TroveError::broadcast("socket server unreachable"))
    }
}

/// What happens right after a `find_by_status` read
pub enum AfterRead {
    /// Hold each reader until this many have read the same row
    Rendezvous(Barrier),
    /// Confirm this member behind the reader's back
    Confirm(String),
}

/// Round store that slips work between a read and the caller's next write,
/// and can fail status updates on demand
pub struct InterleavedStore {
    inner: Arc<dyn RoundStore>,
    pending: Mutex<usize>,
    after_read: Option<AfterRead>,
    failing_updates: Mutex<usize>,
    pub confirmations: Mutex<Vec<Confirmation>>,
}

impl InterleavedStore {
    pub fn new(inner: Arc<dyn RoundStore>) -> Self {
        Self {
            inner,
            pending: Mutex::new(0),
            after_read: None,
            failing_updates: Mutex::new(0),
            confirmations: Mutex::new(Vec::new()),
        }
    }

    /// Run `after_read` following each of the next `reads` reads by status
    pub fn after_reads(mut self, reads: usize, after_read: AfterRead) -> Self {
        self.pending = Mutex::new(reads);
        self.after_read = Some(after_read);
        self
    }

    pub fn fail_next_updates(&self, count: usize) {
        *self.failing_updates.lock() = count;
    }

    fn take(counter: &Mutex<usize>) -> bool {
        let mut remaining = counter.lock();
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }
}

#[async_trait]
impl RoundStore for InterleavedStore {
    async fn insert(&self, round: &LotteryRound) -> trove_core::Result<()> {
        self.inner.insert(round).await
    }

    async fn update_if_status(
        &self,
        round: &LotteryRound,
        expected: RoundStatus,
    ) -> trove_core::Result<bool> {
        if Self::take(&self.failing_updates) {
            return Err(TroveError::internal("disk I/O error"));
        }
        self.inner.update_if_status(round, expected).await
    }

    async fn add_confirmation(&self, round_id: Uuid, member_id: &str) -> trove_core::Result<Confirmation> {
        self.inner.add_confirmation(round_id, member_id).await
    }

    async fn find_by_id(&self, round_id: Uuid) -> trove_core::Result<Option<LotteryRound>> {
        self.inner.find_by_id(round_id).await
    }

    async fn find_by_status(
        &self,
        group_id: &str,
        status: RoundStatus,
    ) -> trove_core::Result<Option<LotteryRound>> {
        let round = self.inner.find_by_status(group_id, status).await?;
        if !Self::take(&self.pending) {
            return Ok(round);
        }
        match &self.after_read {
            Some(AfterRead::Rendezvous(barrier)) => {
                barrier.wait().await;
            }
            Some(AfterRead::Confirm(member_id)) => {
                if let Some(round) = &round {
                    let added = self.inner.add_confirmation(round.id, member_id).await?;
                    self.confirmations.lock().push(added);
                }
            }
            None => {}
        }
        Ok(round)
    }

    async fn find_active(&self, group_id: &str) -> trove_core::Result<Option<LotteryRound>> {
        self.inner.find_active(group_id).await
    }

    async fn find_latest(&self, group_id: &str) -> trove_core::Result<Option<LotteryRound>> {
        self.inner.find_latest(group_id).await
    }

    async fn find_revealing(&self) -> trove_core::Result<Vec<LotteryRound>> {
        self.inner.find_revealing().await
    }
}

pub struct Fixture {
    pub engine: LotteryEngine,
    pub groups: Arc<GroupStore>,
    pub store: Arc<dyn RoundStore>,
    pub hub: Arc<BroadcastHub>,
    pub notifier: Arc<RecordingNotifier>,
    pub group: GroupInfo,
}

impl Fixture {
    pub fn fast_config() -> LotteryConfig {
        LotteryConfig {
            countdown: Duration::from_millis(10),
            spin_duration: Duration::from_millis(10),
            scheduler_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// A group named "Savers" (admin "admin", round 3) with the given members.
    /// Display names are the upper-cased member ids.
    pub async fn with_members(members: &[(&str, u32)]) -> Self {
        Self::with_config(members, Self::fast_config()).await
    }

    pub async fn with_config(members: &[(&str, u32)], config: LotteryConfig) -> Self {
        Self::build(members, config, false).await
    }

    pub async fn with_failing_side_effects(members: &[(&str, u32)]) -> Self {
        Self::build(members, Self::fast_config(), true).await
    }

    /// Another engine over this fixture's group, hub and notifier, as a
    /// second process would see them
    pub fn engine_with(&self, store: Arc<dyn RoundStore>, config: LotteryConfig) -> LotteryEngine {
        LotteryEngine::new(
            Collaborators {
                store,
                members: self.groups.clone(),
                notifier: self.notifier.clone(),
                broadcaster: self.hub.clone(),
            },
            config,
        )
    }

    async fn build(members: &[(&str, u32)], config: LotteryConfig, failing: bool) -> Self {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let groups = Arc::new(GroupStore::new(storage.clone()));
        let store: Arc<dyn RoundStore> = Arc::new(SqliteRoundStore::new(storage));
        let hub = Arc::new(BroadcastHub::new(64));
        let notifier = Arc::new(RecordingNotifier::default());

        let group = groups.create_group("Savers", "admin", 3).await.unwrap();
        for (id, slots) in members {
            groups
                .add_member(
                    &group.id,
                    &GroupMember {
                        member_id: id.to_string(),
                        display_name: Some(id.to_uppercase()),
                        slots: Some(*slots),
                    },
                )
                .await
                .unwrap();
        }

        let (notify, broadcast): (Arc<dyn NotificationPort>, Arc<dyn BroadcastPort>) = if failing {
            (Arc::new(Unreachable), Arc::new(Unreachable))
        } else {
            (notifier.clone(), hub.clone())
        };

        let engine = LotteryEngine::new(
            Collaborators {
                store: store.clone(),
                members: groups.clone(),
                notifier: notify,
                broadcaster: broadcast,
            },
            config,
        );

        Self {
            engine,
            groups,
            store,
            hub,
            notifier,
            group,
        }
    }
}
