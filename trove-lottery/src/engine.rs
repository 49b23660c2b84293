use crate::broadcast::announce;
use crate::commitment::DrawCommitment;
use crate::draw;
use crate::practice::{PracticeRegistry, PracticeSimulator};
use crate::tasks::TaskRegistry;
use crate::{LotteryError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use trove_core::{
    BroadcastPort, Confirmation, GroupInfo, GroupMember, LotteryConfig, LotteryRound,
    MembershipPort, Notification, NotificationCategory, NotificationPort, RoundSnapshot,
    RoundStatus, RoundStore, TroveError,
};
use uuid::Uuid;

const START_ATTEMPTS: u32 = 5;
const PHASE_ATTEMPTS: u32 = 3;
const PHASE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Everything the engine talks to outside its own state
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RoundStore>,
    pub members: Arc<dyn MembershipPort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub broadcaster: Arc<dyn BroadcastPort>,
}

/// Owns the lifecycle of persisted lottery rounds:
/// confirming, then a timed countdown and spin, then completed.
#[derive(Clone)]
pub struct LotteryEngine {
    store: Arc<dyn RoundStore>,
    members: Arc<dyn MembershipPort>,
    notifier: Arc<dyn NotificationPort>,
    broadcaster: Arc<dyn BroadcastPort>,
    practice: PracticeRegistry,
    config: LotteryConfig,
    tasks: Arc<TaskRegistry>,
}

impl LotteryEngine {
    pub fn new(collaborators: Collaborators, config: LotteryConfig) -> Self {
        Self {
            store: collaborators.store,
            members: collaborators.members,
            notifier: collaborators.notifier,
            broadcaster: collaborators.broadcaster,
            practice: PracticeRegistry::new(),
            config,
            tasks: Arc::new(TaskRegistry::new()),
        }
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn practice(&self) -> &PracticeRegistry {
        &self.practice
    }

    /// Simulator sharing this engine's practice registry and task tracking
    pub fn practice_simulator(&self) -> PracticeSimulator {
        PracticeSimulator::new(
            self.members.clone(),
            self.broadcaster.clone(),
            self.practice.clone(),
            self.config.clone(),
            self.tasks.clone(),
        )
    }

    /// Opt `member_id` into the group's current round, opening one if needed
    pub async fn confirm_participation(&self, member_id: &str, group_id: &str) -> Result<LotteryRound> {
        let group = self.members.group(group_id).await?;
        let roster = self.members.members(group_id).await?;
        let joining = roster
            .iter()
            .find(|m| m.member_id == member_id)
            .ok_or_else(|| LotteryError::NotGroupMember {
                member_id: member_id.to_string(),
                group_id: group_id.to_string(),
            })?;

        let (round, opened) = self.open_round(&group).await?;
        if opened {
            let body = format!(
                "A new lottery round for \"{}\" is now open. Join now to participate!",
                group.name
            );
            for member in &roster {
                self.notify(
                    &member.member_id,
                    "Lottery Open! 🎡",
                    body.clone(),
                    NotificationCategory::LotteryOpen,
                    group_id,
                )
                .await;
            }
        }

        match self.store.add_confirmation(round.id, member_id).await? {
            Confirmation::AlreadyConfirmed(round) => {
                tracing::debug!("Member {} already confirmed for round {}", member_id, round.id);
                Ok(round)
            }
            Confirmation::Closed => Err(LotteryError::RoundInProgress(group_id.to_string())),
            Confirmation::Added(round) => {
                tracing::info!(
                    "Member {} confirmed for round {} of group {} ({} confirmed)",
                    member_id,
                    round.round_number,
                    group_id,
                    round.confirmed_members.len()
                );
                announce(self.broadcaster.as_ref(), &round.snapshot());

                let body = format!("{} just joined the lottery round!", joining.name_or_default());
                for other in round.confirmed_members.iter().filter(|m| *m != member_id) {
                    self.notify(
                        other,
                        "Lottery Update 🎡",
                        body.clone(),
                        NotificationCategory::LotteryJoin,
                        group_id,
                    )
                    .await;
                }

                Ok(round)
            }
        }
    }

    /// Returns the group's confirming round, creating it if the group has none open
    async fn open_round(&self, group: &GroupInfo) -> Result<(LotteryRound, bool)> {
        if let Some(active) = self.store.find_active(&group.id).await? {
            return match active.status {
                RoundStatus::Confirming => Ok((active, false)),
                _ => Err(LotteryError::RoundInProgress(group.id.clone())),
            };
        }

        let round = LotteryRound::new(&group.id, group.current_round);
        match self.store.insert(&round).await {
            Ok(()) => {
                tracing::info!(
                    "Opened lottery round {} for group {} ({})",
                    round.round_number,
                    group.name,
                    group.id
                );
                Ok((round, true))
            }
            Err(TroveError::Conflict(_)) => {
                // a concurrent confirmation opened it first
                match self.store.find_active(&group.id).await? {
                    Some(active) if active.status == RoundStatus::Confirming => Ok((active, false)),
                    _ => Err(LotteryError::RoundInProgress(group.id.clone())),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fix the payout order and kick off the timed reveal.
    ///
    /// Returns as soon as the countdown is committed; the spin and completion
    /// happen on a background task.
    pub async fn start_selection(&self, group_id: &str) -> Result<RoundSnapshot> {
        let mut attempt = 1;
        loop {
            let round = self
                .store
                .find_by_status(group_id, RoundStatus::Confirming)
                .await?
                .ok_or_else(|| LotteryError::NoActiveConfirmation(group_id.to_string()))?;

            if round.confirmed_members.is_empty() {
                return Err(LotteryError::NoConfirmedMembers);
            }

            let round_id = round.id;
            if let Some(snapshot) = self.try_start(round).await? {
                return Ok(snapshot);
            }

            // lost the compare-and-set: either another start won or a
            // confirmation landed after our read
            let current = self
                .store
                .find_by_id(round_id)
                .await?
                .ok_or(LotteryError::RoundNotFound(round_id))?;
            if current.status != RoundStatus::Confirming {
                return Err(LotteryError::SelectionAlreadyStarted(round_id));
            }
            if attempt >= START_ATTEMPTS {
                return Err(LotteryError::InvalidState(format!(
                    "confirmations for round {} kept changing during selection",
                    round_id
                )));
            }

            tracing::debug!(
                "Confirmations for round {} changed during selection, drawing again",
                round_id
            );
            attempt += 1;
        }
    }

    /// Draw over `round`'s confirmations and commit the countdown. `None`
    /// when the stored round no longer matches what was read.
    async fn try_start(&self, mut round: LotteryRound) -> Result<Option<RoundSnapshot>> {
        let group_id = round.group_id.clone();
        let group = self.members.group(&group_id).await?;
        let roster = self.members.members(&group_id).await?;
        let entrants = draw::confirmed_entrants(&round.confirmed_members, &roster);
        let order = draw::weighted_draw(&entrants)?;
        let commitment = DrawCommitment::seal(&order);

        let now = Utc::now();
        let countdown = chrono::Duration::from_std(self.config.countdown)
            .unwrap_or_else(|_| chrono::Duration::zero());

        round.status = RoundStatus::Countdown;
        round.drawn_order = order;
        round.payout_order.clear();
        round.draw_commitment = Some(commitment.hash);
        round.draw_nonce = Some(commitment.nonce);
        round.countdown_end = Some(now + countdown);
        round.started_at = Some(now);

        if !self
            .store
            .update_if_status(&round, RoundStatus::Confirming)
            .await?
        {
            return Ok(None);
        }

        tracing::info!(
            "Selection started for round {} of group {} with {} tickets",
            round.round_number,
            group_id,
            round.drawn_order.len()
        );

        let snapshot = round.snapshot();
        announce(self.broadcaster.as_ref(), &snapshot);
        self.spawn_reveal(round.id, self.config.countdown, self.config.spin_duration);

        let body = format!(
            "The lottery selection for \"{}\" is starting now. Watch the results live!",
            group.name
        );
        for member in &roster {
            self.notify(
                &member.member_id,
                "Selection Starting! 🎰",
                body.clone(),
                NotificationCategory::LotteryStart,
                &group_id,
            )
            .await;
        }

        Ok(Some(snapshot))
    }

    /// Pick up reveals left unfinished by a previous process. A round still
    /// counting down waits out what is left of its countdown.
    pub async fn resume_reveals(&self) -> Result<usize> {
        let rounds = self.store.find_revealing().await?;
        let now = Utc::now();

        for round in &rounds {
            tracing::info!(
                "Resuming {} reveal of round {} for group {}",
                round.status,
                round.round_number,
                round.group_id
            );

            if round.status == RoundStatus::Countdown {
                let remaining = round
                    .countdown_end
                    .and_then(|end| (end - now).to_std().ok())
                    .unwrap_or(Duration::ZERO);
                self.spawn_reveal(round.id, remaining, self.config.spin_duration);
            } else {
                self.spawn_completion(round.id);
            }
        }

        Ok(rounds.len())
    }

    fn spawn_reveal(&self, round_id: Uuid, countdown: Duration, spin: Duration) {
        let engine = self.clone();
        self.tasks.spawn_cancellable(async move {
            engine.run_reveal(round_id, countdown, spin).await;
        });
    }

    fn spawn_completion(&self, round_id: Uuid) {
        let engine = self.clone();
        self.tasks.spawn_cancellable(async move {
            if let Err(e) = engine.run_phase(round_id, RoundStatus::Completed).await {
                tracing::error!("Reveal of round {} failed to complete: {}", round_id, e);
            }
        });
    }

    async fn run_reveal(self, round_id: Uuid, countdown: Duration, spin: Duration) {
        tokio::time::sleep(countdown).await;
        if let Err(e) = self.run_phase(round_id, RoundStatus::Spinning).await {
            tracing::error!("Reveal of round {} abandoned before spinning: {}", round_id, e);
            return;
        }

        tokio::time::sleep(spin).await;
        if let Err(e) = self.run_phase(round_id, RoundStatus::Completed).await {
            tracing::error!("Reveal of round {} failed to complete: {}", round_id, e);
        }
    }

    /// Move the round into `phase`, retrying store failures
    async fn run_phase(&self, round_id: Uuid, phase: RoundStatus) -> Result<()> {
        let mut attempt = 1;
        loop {
            let result = match phase {
                RoundStatus::Spinning => self.enter_spinning(round_id).await,
                _ => self.complete_round(round_id).await,
            };

            match result {
                Err(e) if e.is_retryable() && attempt < PHASE_ATTEMPTS => {
                    tracing::warn!(
                        "Moving round {} to {} failed (attempt {}): {}",
                        round_id,
                        phase,
                        attempt,
                        e
                    );
                    tokio::time::sleep(PHASE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn enter_spinning(&self, round_id: Uuid) -> Result<()> {
        let mut round = self.load_for_reveal(round_id, RoundStatus::Countdown).await?;

        let winner = round
            .drawn_order
            .first()
            .cloned()
            .ok_or_else(|| LotteryError::InvalidState(format!("round {} has no draw", round_id)))?;

        round.selected_name = Some(self.resolve_name(&round.group_id, &winner).await);
        round.selected_id = Some(winner);
        round.status = RoundStatus::Spinning;

        self.advance(&round, RoundStatus::Countdown).await
    }

    async fn complete_round(&self, round_id: Uuid) -> Result<()> {
        let mut round = self.load_for_reveal(round_id, RoundStatus::Spinning).await?;

        round.payout_order = round.drawn_order.clone();
        round.status = RoundStatus::Completed;
        round.completed_at = Some(Utc::now());

        self.advance(&round, RoundStatus::Spinning).await
    }

    async fn load_for_reveal(&self, round_id: Uuid, expected: RoundStatus) -> Result<LotteryRound> {
        let round = self
            .store
            .find_by_id(round_id)
            .await?
            .ok_or(LotteryError::RoundNotFound(round_id))?;

        if round.status != expected {
            return Err(LotteryError::InvalidState(format!(
                "round {} is {} but the reveal expected {}",
                round_id, round.status, expected
            )));
        }

        Ok(round)
    }

    /// Persist a forward transition from `from`, then broadcast it
    async fn advance(&self, round: &LotteryRound, from: RoundStatus) -> Result<()> {
        if from.next() != Some(round.status) {
            return Err(LotteryError::InvalidState(format!(
                "round {} cannot move from {} to {}",
                round.id, from, round.status
            )));
        }

        if !self.store.update_if_status(round, from).await? {
            return Err(LotteryError::InvalidState(format!(
                "round {} left {} before it could move to {}",
                round.id, from, round.status
            )));
        }

        tracing::info!(
            "Round {} of group {} is now {}",
            round.round_number,
            round.group_id,
            round.status
        );
        announce(self.broadcaster.as_ref(), &round.snapshot());
        Ok(())
    }

    async fn resolve_name(&self, group_id: &str, member_id: &str) -> String {
        let from_roster = match self.members.members(group_id).await {
            Ok(roster) => roster
                .into_iter()
                .find(|m| m.member_id == member_id)
                .and_then(|m: GroupMember| m.display_name),
            Err(e) => {
                tracing::warn!("Could not load roster for group {}: {}", group_id, e);
                None
            }
        };

        if let Some(name) = from_roster {
            return name;
        }

        match self.members.display_name(member_id).await {
            Ok(Some(name)) => name,
            Ok(None) => "Member".to_string(),
            Err(e) => {
                tracing::warn!("Could not resolve name for member {}: {}", member_id, e);
                "Member".to_string()
            }
        }
    }

    /// Practice session if one is live, else the group's latest persisted round
    pub async fn status(&self, group_id: &str) -> Result<Option<RoundSnapshot>> {
        if let Some(practice) = self.practice.snapshot(group_id) {
            return Ok(Some(practice));
        }

        Ok(self
            .store
            .find_latest(group_id)
            .await?
            .map(|round| round.snapshot()))
    }

    pub async fn latest_round(&self, group_id: &str) -> Result<Option<LotteryRound>> {
        Ok(self.store.find_latest(group_id).await?)
    }

    pub async fn confirming_round(&self, group_id: &str) -> Result<Option<LotteryRound>> {
        Ok(self
            .store
            .find_by_status(group_id, RoundStatus::Confirming)
            .await?)
    }

    /// Tell watchers to start fresh. Persisted rounds and in-flight reveals
    /// are left alone.
    pub fn reset(&self, group_id: &str) {
        tracing::info!("Broadcasting lottery reset for group {}", group_id);
        announce(self.broadcaster.as_ref(), &RoundSnapshot::reset(group_id));
    }

    pub(crate) async fn notify(
        &self,
        member_id: &str,
        title: &str,
        body: String,
        category: NotificationCategory,
        group_id: &str,
    ) {
        let notification = Notification {
            member_id: member_id.to_string(),
            title: title.to_string(),
            body,
            category,
            related_id: group_id.to_string(),
            deep_link: self.config.deep_link.clone(),
        };

        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(
                "Failed to send {} notification to member {}: {}",
                category.as_str(),
                member_id,
                e
            );
        }
    }

    /// Wait for every in-flight reveal (real or practice) to finish
    pub async fn wait_for_reveals(&self) {
        self.tasks.wait_idle().await;
    }

    pub fn shutdown(&self) {
        self.tasks.shutdown();
    }
}
