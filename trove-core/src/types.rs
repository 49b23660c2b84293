use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TroveError;

/// Lifecycle of a lottery round. Persisted rounds never reach `Practice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Confirming,
    Countdown,
    Spinning,
    Completed,
    Practice,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Confirming => "confirming",
            RoundStatus::Countdown => "countdown",
            RoundStatus::Spinning => "spinning",
            RoundStatus::Completed => "completed",
            RoundStatus::Practice => "practice",
        }
    }

    /// Next status of a persisted round, if any
    pub fn next(&self) -> Option<RoundStatus> {
        match self {
            RoundStatus::Confirming => Some(RoundStatus::Countdown),
            RoundStatus::Countdown => Some(RoundStatus::Spinning),
            RoundStatus::Spinning => Some(RoundStatus::Completed),
            RoundStatus::Completed | RoundStatus::Practice => None,
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundStatus {
    type Err = TroveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirming" => Ok(RoundStatus::Confirming),
            "countdown" => Ok(RoundStatus::Countdown),
            "spinning" => Ok(RoundStatus::Spinning),
            "completed" => Ok(RoundStatus::Completed),
            "practice" => Ok(RoundStatus::Practice),
            other => Err(TroveError::internal(format!(
                "Unknown round status: {}",
                other
            ))),
        }
    }
}

/// One execution of the payout-order lottery for a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryRound {
    pub id: Uuid,
    pub group_id: String,
    pub round_number: u32,
    pub status: RoundStatus,
    pub confirmed_members: Vec<String>,
    /// Client-visible order, filled only once the round completes
    pub payout_order: Vec<String>,
    /// Full draw computed when selection starts
    #[serde(skip)]
    pub drawn_order: Vec<String>,
    pub draw_commitment: Option<String>,
    #[serde(skip)]
    pub draw_nonce: Option<String>,
    pub selected_id: Option<String>,
    pub selected_name: Option<String>,
    pub countdown_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LotteryRound {
    pub fn new(group_id: impl Into<String>, round_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id: group_id.into(),
            round_number,
            status: RoundStatus::Confirming,
            confirmed_members: Vec::new(),
            payout_order: Vec::new(),
            drawn_order: Vec::new(),
            draw_commitment: None,
            draw_nonce: None,
            selected_id: None,
            selected_name: None,
            countdown_end: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_confirmed(&self, member_id: &str) -> bool {
        self.confirmed_members.iter().any(|m| m == member_id)
    }

    /// Client view; the drawn order and nonce only leave once completed
    pub fn snapshot(&self) -> RoundSnapshot {
        let completed = self.status == RoundStatus::Completed;
        RoundSnapshot {
            group_id: self.group_id.clone(),
            round: self.round_number,
            status: self.status,
            confirmed_members: self.confirmed_members.clone(),
            payout_order: if completed {
                self.payout_order.clone()
            } else {
                Vec::new()
            },
            selected_id: self.selected_id.clone(),
            selected_name: self.selected_name.clone(),
            countdown_end: self.countdown_end,
            draw_commitment: self.draw_commitment.clone(),
            draw_nonce: if completed {
                self.draw_nonce.clone()
            } else {
                None
            },
            is_practice: false,
        }
    }
}

/// Round state as pushed to clients watching a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub group_id: String,
    pub round: u32,
    pub status: RoundStatus,
    pub confirmed_members: Vec<String>,
    pub payout_order: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_commitment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_nonce: Option<String>,
    pub is_practice: bool,
}

impl RoundSnapshot {
    /// "Start fresh" signal: back to confirming with nothing confirmed
    pub fn reset(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            round: 0,
            status: RoundStatus::Confirming,
            confirmed_members: Vec::new(),
            payout_order: Vec::new(),
            selected_id: None,
            selected_name: None,
            countdown_end: None,
            draw_commitment: None,
            draw_nonce: None,
            is_practice: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub admin_id: String,
    pub current_round: u32,
    pub next_lottery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub member_id: String,
    pub display_name: Option<String>,
    pub slots: Option<u32>,
}

impl GroupMember {
    /// Draw weight; missing or zero slots count as one
    pub fn weight(&self) -> u32 {
        self.slots.filter(|s| *s > 0).unwrap_or(1)
    }

    pub fn name_or_default(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| "Member".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    LotteryOpen,
    LotteryJoin,
    LotteryStart,
    LotterySkipped,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::LotteryOpen => "lottery_open",
            NotificationCategory::LotteryJoin => "lottery_join",
            NotificationCategory::LotteryStart => "lottery_start",
            NotificationCategory::LotterySkipped => "lottery_skipped",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = TroveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lottery_open" => Ok(NotificationCategory::LotteryOpen),
            "lottery_join" => Ok(NotificationCategory::LotteryJoin),
            "lottery_start" => Ok(NotificationCategory::LotteryStart),
            "lottery_skipped" => Ok(NotificationCategory::LotterySkipped),
            other => Err(TroveError::internal(format!(
                "Unknown notification category: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub member_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_id: String,
    pub deep_link: String,
}
