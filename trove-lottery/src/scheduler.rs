use crate::engine::LotteryEngine;
use crate::tasks::TaskRegistry;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trove_core::{GroupInfo, GroupSchedulePort, NotificationCategory};

/// What a single scan did with each due group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub cleared: Vec<String>,
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.skipped.is_empty()
            && self.cleared.is_empty()
            && self.failed.is_empty()
    }
}

enum ScanOutcome {
    Started,
    Skipped,
    Cleared,
}

/// Starts scheduled rounds once a quorum of members has confirmed
pub struct RoundScheduler {
    engine: LotteryEngine,
    schedule: Arc<dyn GroupSchedulePort>,
    tasks: TaskRegistry,
}

impl RoundScheduler {
    pub fn new(engine: LotteryEngine, schedule: Arc<dyn GroupSchedulePort>) -> Self {
        Self {
            engine,
            schedule,
            tasks: TaskRegistry::new(),
        }
    }

    /// Scan every group whose scheduled lottery time is at or before `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let groups = self.schedule.due_groups(now).await?;
        let mut report = ScanReport::default();

        for group in groups {
            match self.process_group(&group).await {
                Ok(ScanOutcome::Started) => report.started.push(group.id),
                Ok(ScanOutcome::Skipped) => report.skipped.push(group.id),
                Ok(ScanOutcome::Cleared) => report.cleared.push(group.id),
                Err(e) => {
                    tracing::error!(
                        "Error processing scheduled lottery for group {}: {}",
                        group.id,
                        e
                    );
                    report.failed.push(group.id);
                }
            }
        }

        Ok(report)
    }

    async fn process_group(&self, group: &GroupInfo) -> Result<ScanOutcome> {
        let Some(round) = self.engine.confirming_round(&group.id).await? else {
            self.schedule.clear_schedule(&group.id).await?;
            tracing::warn!(
                "Scheduled lottery for group {} cleared: no active confirmation phase found",
                group.name
            );
            return Ok(ScanOutcome::Cleared);
        };

        let confirmed = round.confirmed_members.len();
        let quorum = self.engine.config().minimum_quorum;

        if confirmed >= quorum {
            tracing::info!(
                "Automatically starting lottery for group {} ({})",
                group.name,
                group.id
            );
            self.engine.start_selection(&group.id).await?;
            self.schedule.clear_schedule(&group.id).await?;
            return Ok(ScanOutcome::Started);
        }

        self.schedule.clear_schedule(&group.id).await?;
        self.engine
            .notify(
                &group.admin_id,
                "Lottery Skipped",
                format!(
                    "The scheduled lottery for \"{}\" was skipped because only {} members confirmed (minimum {} required).",
                    group.name, confirmed, quorum
                ),
                NotificationCategory::LotterySkipped,
                &group.id,
            )
            .await;
        tracing::warn!(
            "Scheduled lottery for group {} skipped: only {} members confirmed (minimum {} required)",
            group.name,
            confirmed,
            quorum
        );

        Ok(ScanOutcome::Skipped)
    }

    /// Scan on the configured interval until `shutdown` is called
    pub fn start(self: &Arc<Self>) {
        let interval = self.engine.config().scheduler_interval;
        let scheduler = Arc::clone(self);

        tracing::info!("Round scheduler running every {:?}", interval);
        self.tasks.spawn_interval_until(interval, move || {
            let scheduler = scheduler.clone();
            async move {
                match scheduler.run_once(Utc::now()).await {
                    Ok(report) if !report.is_empty() => {
                        tracing::info!(
                            "Scheduler scan: {} started, {} skipped, {} cleared, {} failed",
                            report.started.len(),
                            report.skipped.len(),
                            report.cleared.len(),
                            report.failed.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Scheduler scan failed: {}", e),
                }
                true
            }
        });
    }

    pub fn shutdown(&self) {
        self.tasks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use chrono::Duration;
    use trove_core::{MembershipPort, RoundStatus};

    async fn due_fixture(members: &[(&str, u32)], confirming: &[&str]) -> (Fixture, RoundScheduler) {
        let fx = Fixture::with_members(members).await;
        for id in confirming {
            fx.engine.confirm_participation(id, &fx.group.id).await.unwrap();
        }
        fx.groups
            .schedule_lottery(&fx.group.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let scheduler = RoundScheduler::new(fx.engine.clone(), fx.groups.clone());
        (fx, scheduler)
    }

    #[tokio::test]
    async fn test_quorum_starts_round_and_clears_schedule() {
        let (fx, scheduler) =
            due_fixture(&[("a", 1), ("b", 1), ("c", 1)], &["a", "b", "c"]).await;

        let report = scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(report.started, vec![fx.group.id.clone()]);

        let round = fx.engine.latest_round(&fx.group.id).await.unwrap().unwrap();
        assert_ne!(round.status, RoundStatus::Confirming);
        assert!(fx.groups.group(&fx.group.id).await.unwrap().next_lottery_at.is_none());

        fx.engine.wait_for_reveals().await;
        let round = fx.engine.latest_round(&fx.group.id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Completed);
    }

    #[tokio::test]
    async fn test_below_quorum_skips_and_notifies_admin() {
        let (fx, scheduler) = due_fixture(&[("a", 1), ("b", 1), ("c", 1)], &["a", "b"]).await;

        let report = scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(report.skipped, vec![fx.group.id.clone()]);

        let round = fx.engine.latest_round(&fx.group.id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Confirming);
        assert_eq!(round.confirmed_members.len(), 2);
        assert!(fx.groups.group(&fx.group.id).await.unwrap().next_lottery_at.is_none());

        let skipped = fx.notifier.for_category(NotificationCategory::LotterySkipped);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].member_id, "admin");

        // cleared schedule means the next scan leaves the group alone
        assert!(scheduler.run_once(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_confirming_round_just_clears() {
        let (fx, scheduler) = due_fixture(&[("a", 1)], &[]).await;

        let report = scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(report.cleared, vec![fx.group.id.clone()]);
        assert!(fx.engine.latest_round(&fx.group.id).await.unwrap().is_none());
        assert_eq!(fx.notifier.count(NotificationCategory::LotterySkipped), 0);
    }

    #[tokio::test]
    async fn test_future_schedule_is_ignored() {
        let fx = Fixture::with_members(&[("a", 1)]).await;
        fx.groups
            .schedule_lottery(&fx.group.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let scheduler = RoundScheduler::new(fx.engine.clone(), fx.groups.clone());

        assert!(scheduler.run_once(Utc::now()).await.unwrap().is_empty());
    }

    /// Schedule port whose clear fails for one group
    struct BrokenClear {
        inner: Arc<trove_core::GroupStore>,
        broken: String,
    }

    #[async_trait::async_trait]
    impl GroupSchedulePort for BrokenClear {
        async fn due_groups(&self, now: DateTime<Utc>) -> trove_core::Result<Vec<GroupInfo>> {
            self.inner.due_groups(now).await
        }

        async fn clear_schedule(&self, group_id: &str) -> trove_core::Result<()> {
            if group_id == self.broken {
                return Err(trove_core::TroveError::internal("schedule table locked"));
            }
            self.inner.clear_schedule(group_id).await
        }
    }

    #[tokio::test]
    async fn test_one_failing_group_does_not_stop_the_scan() {
        let (fx, _) = due_fixture(&[("a", 1), ("b", 1), ("c", 1)], &["a", "b", "c"]).await;

        // due earlier, so it is scanned first
        let broken = fx.groups.create_group("Broken", "admin", 1).await.unwrap();
        fx.groups
            .schedule_lottery(&broken.id, Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        let scheduler = RoundScheduler::new(
            fx.engine.clone(),
            Arc::new(BrokenClear {
                inner: fx.groups.clone(),
                broken: broken.id.clone(),
            }),
        );
        let report = scheduler.run_once(Utc::now()).await.unwrap();

        assert_eq!(report.failed, vec![broken.id.clone()]);
        assert_eq!(report.started, vec![fx.group.id.clone()]);
        fx.engine.wait_for_reveals().await;
    }

    #[tokio::test]
    async fn test_background_loop_runs_until_shutdown() {
        let (fx, scheduler) =
            due_fixture(&[("a", 1), ("b", 1), ("c", 1)], &["a", "b", "c"]).await;
        let scheduler = Arc::new(scheduler);
        let mut rx = fx.hub.subscribe(&fx.group.id);

        scheduler.start();
        loop {
            let snapshot = rx.recv().await.unwrap();
            if snapshot.status == RoundStatus::Completed {
                break;
            }
        }
        scheduler.shutdown();

        assert!(fx.groups.group(&fx.group.id).await.unwrap().next_lottery_at.is_none());
    }
}
