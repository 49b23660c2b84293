use crate::broadcast::announce;
use crate::commitment::DrawCommitment;
use crate::draw::{self, Entrant};
use crate::tasks::TaskRegistry;
use crate::{LotteryError, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use trove_core::{BroadcastPort, LotteryConfig, MembershipPort, RoundSnapshot, RoundStatus};
use uuid::Uuid;

/// Rehearsal round held only in memory
#[derive(Debug, Clone)]
pub struct PracticeSession {
    pub session_id: Uuid,
    pub snapshot: RoundSnapshot,
    drawn_order: Vec<String>,
    winner_name: String,
    nonce: String,
}

/// Practice sessions keyed by group, shared by the engine and simulator
#[derive(Debug, Clone, Default)]
pub struct PracticeRegistry {
    sessions: Arc<RwLock<HashMap<String, PracticeSession>>>,
}

impl PracticeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, group_id: &str) -> Option<RoundSnapshot> {
        self.sessions
            .read()
            .get(group_id)
            .map(|session| session.snapshot.clone())
    }

    pub fn session_id(&self, group_id: &str) -> Option<Uuid> {
        self.sessions.read().get(group_id).map(|s| s.session_id)
    }

    fn insert(&self, group_id: &str, session: PracticeSession) {
        self.sessions.write().insert(group_id.to_string(), session);
    }

    /// Apply `f` only if `session_id` is still the group's current session
    fn update_current<F>(&self, group_id: &str, session_id: Uuid, f: F) -> Option<RoundSnapshot>
    where
        F: FnOnce(&mut PracticeSession),
    {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(group_id)
            .filter(|s| s.session_id == session_id)?;
        f(session);
        Some(session.snapshot.clone())
    }

    pub fn clear(&self, group_id: &str) -> bool {
        self.sessions.write().remove(group_id).is_some()
    }
}

/// Runs the real reveal sequence against throwaway state
#[derive(Clone)]
pub struct PracticeSimulator {
    members: Arc<dyn MembershipPort>,
    broadcaster: Arc<dyn BroadcastPort>,
    registry: PracticeRegistry,
    config: LotteryConfig,
    tasks: Arc<TaskRegistry>,
}

impl PracticeSimulator {
    pub fn new(
        members: Arc<dyn MembershipPort>,
        broadcaster: Arc<dyn BroadcastPort>,
        registry: PracticeRegistry,
        config: LotteryConfig,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            members,
            broadcaster,
            registry,
            config,
            tasks,
        }
    }

    /// Draw over every group member and start the timed reveal
    pub async fn start_practice(&self, group_id: &str) -> Result<RoundSnapshot> {
        let group = self.members.group(group_id).await?;
        let roster = self.members.members(group_id).await?;
        if roster.is_empty() {
            return Err(LotteryError::NoGroupMembers(group_id.to_string()));
        }

        let entrants: Vec<Entrant> = roster.iter().map(Entrant::from).collect();
        let order = draw::weighted_draw(&entrants)?;
        let commitment = DrawCommitment::seal(&order);
        let winner_name = roster
            .iter()
            .find(|m| Some(&m.member_id) == order.first())
            .map(|m| m.name_or_default())
            .unwrap_or_else(|| "Member".to_string());

        let countdown = chrono::Duration::from_std(self.config.countdown)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let snapshot = RoundSnapshot {
            group_id: group_id.to_string(),
            round: group.current_round,
            status: RoundStatus::Countdown,
            confirmed_members: Vec::new(),
            payout_order: Vec::new(),
            selected_id: None,
            selected_name: None,
            countdown_end: Some(Utc::now() + countdown),
            draw_commitment: Some(commitment.hash),
            draw_nonce: None,
            is_practice: true,
        };

        let session_id = Uuid::new_v4();
        self.registry.insert(
            group_id,
            PracticeSession {
                session_id,
                snapshot: snapshot.clone(),
                drawn_order: order,
                winner_name,
                nonce: commitment.nonce,
            },
        );

        tracing::info!(
            "Practice session {} started for group {}",
            session_id,
            group_id
        );
        announce(self.broadcaster.as_ref(), &snapshot);

        let simulator = self.clone();
        let group_id = group_id.to_string();
        self.tasks.spawn_cancellable(async move {
            simulator.run_reveal(group_id, session_id).await;
        });

        Ok(snapshot)
    }

    async fn run_reveal(self, group_id: String, session_id: Uuid) {
        tokio::time::sleep(self.config.countdown).await;

        let spinning = self.registry.update_current(&group_id, session_id, |session| {
            session.snapshot.status = RoundStatus::Spinning;
            session.snapshot.selected_id = session.drawn_order.first().cloned();
            session.snapshot.selected_name = Some(session.winner_name.clone());
        });
        let Some(snapshot) = spinning else {
            tracing::debug!("Practice session {} superseded before spinning", session_id);
            return;
        };
        announce(self.broadcaster.as_ref(), &snapshot);

        tokio::time::sleep(self.config.spin_duration).await;

        let finished = self.registry.update_current(&group_id, session_id, |session| {
            session.snapshot.status = RoundStatus::Practice;
            session.snapshot.payout_order = session.drawn_order.clone();
            session.snapshot.draw_nonce = Some(session.nonce.clone());
        });
        let Some(snapshot) = finished else {
            tracing::debug!("Practice session {} superseded before completion", session_id);
            return;
        };

        tracing::info!("Practice session {} finished for group {}", session_id, group_id);
        announce(self.broadcaster.as_ref(), &snapshot);
    }

    /// Drop the group's practice session and tell clients to start fresh
    pub fn reset_practice(&self, group_id: &str) {
        if self.registry.clear(group_id) {
            tracing::info!("Cleared practice session for group {}", group_id);
        }
        announce(self.broadcaster.as_ref(), &RoundSnapshot::reset(group_id));
    }
}
