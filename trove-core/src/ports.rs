//! Narrow interfaces to the collaborators around the lottery engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{GroupInfo, GroupMember, LotteryRound, Notification, RoundSnapshot, RoundStatus};

/// Read-only view of groups and their members
#[async_trait]
pub trait MembershipPort: Send + Sync {
    async fn group(&self, group_id: &str) -> Result<GroupInfo>;

    async fn members(&self, group_id: &str) -> Result<Vec<GroupMember>>;

    async fn display_name(&self, member_id: &str) -> Result<Option<String>>;
}

/// Groups carrying a scheduled lottery time
#[async_trait]
pub trait GroupSchedulePort: Send + Sync {
    async fn due_groups(&self, now: DateTime<Utc>) -> Result<Vec<GroupInfo>>;

    async fn clear_schedule(&self, group_id: &str) -> Result<()>;
}

/// Fan-out of round snapshots to everyone watching a group.
/// Best effort: callers log failures and carry on.
pub trait BroadcastPort: Send + Sync {
    fn publish(&self, group_id: &str, snapshot: &RoundSnapshot) -> Result<()>;
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Outcome of an atomic confirmation attempt
#[derive(Debug, Clone)]
pub enum Confirmation {
    Added(LotteryRound),
    AlreadyConfirmed(LotteryRound),
    /// The round left `Confirming` (or vanished) before the add landed
    Closed,
}

#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Fails with `TroveError::Conflict` if the group already has an open round
    async fn insert(&self, round: &LotteryRound) -> Result<()>;

    /// Persist `round` only if the stored copy is still in `expected` with
    /// the same confirmed members. Returns whether the write happened.
    async fn update_if_status(&self, round: &LotteryRound, expected: RoundStatus) -> Result<bool>;

    async fn add_confirmation(&self, round_id: Uuid, member_id: &str) -> Result<Confirmation>;

    async fn find_by_id(&self, round_id: Uuid) -> Result<Option<LotteryRound>>;

    async fn find_by_status(&self, group_id: &str, status: RoundStatus) -> Result<Option<LotteryRound>>;

    /// The round in `Confirming`, `Countdown` or `Spinning`, if any
    async fn find_active(&self, group_id: &str) -> Result<Option<LotteryRound>>;

    async fn find_latest(&self, group_id: &str) -> Result<Option<LotteryRound>>;

    /// Rounds in `Countdown` or `Spinning` across all groups, oldest first
    async fn find_revealing(&self) -> Result<Vec<LotteryRound>>;
}
