use crate::error::{Result, TroveError};
use crate::ports::{Confirmation, RoundStore};
use crate::storage::{from_millis, to_millis, Storage};
use crate::types::{LotteryRound, RoundStatus};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use uuid::Uuid;

const ROUND_COLUMNS: &str = "id, group_id, round_number, status, confirmed_members, payout_order,
     drawn_order, draw_commitment, draw_nonce, selected_id, selected_name, countdown_end,
     created_at, started_at, completed_at";

/// SQLite-backed persistence for lottery rounds
pub struct SqliteRoundStore {
    storage: Arc<Storage>,
}

impl SqliteRoundStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

/// Raw column values; JSON columns are decoded outside the rusqlite closure
struct RoundRow {
    id: String,
    group_id: String,
    round_number: u32,
    status: String,
    confirmed_members: String,
    payout_order: String,
    drawn_order: String,
    draw_commitment: Option<String>,
    draw_nonce: Option<String>,
    selected_id: Option<String>,
    selected_name: Option<String>,
    countdown_end: Option<i64>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl RoundRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            round_number: row.get(2)?,
            status: row.get(3)?,
            confirmed_members: row.get(4)?,
            payout_order: row.get(5)?,
            drawn_order: row.get(6)?,
            draw_commitment: row.get(7)?,
            draw_nonce: row.get(8)?,
            selected_id: row.get(9)?,
            selected_name: row.get(10)?,
            countdown_end: row.get(11)?,
            created_at: row.get(12)?,
            started_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }

    fn into_round(self) -> Result<LotteryRound> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| TroveError::internal(format!("Invalid round id {}: {}", self.id, e)))?;

        Ok(LotteryRound {
            id,
            group_id: self.group_id,
            round_number: self.round_number,
            status: self.status.parse()?,
            confirmed_members: serde_json::from_str(&self.confirmed_members)?,
            payout_order: serde_json::from_str(&self.payout_order)?,
            drawn_order: serde_json::from_str(&self.drawn_order)?,
            draw_commitment: self.draw_commitment,
            draw_nonce: self.draw_nonce,
            selected_id: self.selected_id,
            selected_name: self.selected_name,
            countdown_end: self.countdown_end.map(from_millis),
            created_at: from_millis(self.created_at),
            started_at: self.started_at.map(from_millis),
            completed_at: self.completed_at.map(from_millis),
        })
    }
}

fn load_round<P: rusqlite::Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> Result<Option<LotteryRound>> {
    let sql = format!(
        "SELECT {} FROM lottery_rounds WHERE {} LIMIT 1",
        ROUND_COLUMNS, clause
    );
    let row = conn.query_row(&sql, params, RoundRow::from_row).optional()?;
    row.map(RoundRow::into_round).transpose()
}

#[async_trait]
impl RoundStore for SqliteRoundStore {
    async fn insert(&self, round: &LotteryRound) -> Result<()> {
        let conn = self.storage.get_connection().await;

        let result = conn.execute(
            "INSERT INTO lottery_rounds (id, group_id, round_number, status, confirmed_members,
                 payout_order, drawn_order, draw_commitment, draw_nonce, selected_id, selected_name,
                 countdown_end, created_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                round.id.to_string(),
                round.group_id,
                round.round_number,
                round.status.as_str(),
                serde_json::to_string(&round.confirmed_members)?,
                serde_json::to_string(&round.payout_order)?,
                serde_json::to_string(&round.drawn_order)?,
                round.draw_commitment,
                round.draw_nonce,
                round.selected_id,
                round.selected_name,
                round.countdown_end.map(to_millis),
                to_millis(round.created_at),
                round.started_at.map(to_millis),
                round.completed_at.map(to_millis),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(TroveError::conflict(format!(
                    "Group {} already has an open round",
                    round.group_id
                )))
            }
            Err(e) => Err(TroveError::Storage(e)),
        }
    }

    async fn update_if_status(&self, round: &LotteryRound, expected: RoundStatus) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let changed = conn.execute(
            "UPDATE lottery_rounds SET
                 status = ?2, confirmed_members = ?3, payout_order = ?4, drawn_order = ?5,
                 draw_commitment = ?6, draw_nonce = ?7, selected_id = ?8, selected_name = ?9,
                 countdown_end = ?10, started_at = ?11, completed_at = ?12
             WHERE id = ?1 AND status = ?13 AND confirmed_members = ?3",
            params![
                round.id.to_string(),
                round.status.as_str(),
                serde_json::to_string(&round.confirmed_members)?,
                serde_json::to_string(&round.payout_order)?,
                serde_json::to_string(&round.drawn_order)?,
                round.draw_commitment,
                round.draw_nonce,
                round.selected_id,
                round.selected_name,
                round.countdown_end.map(to_millis),
                round.started_at.map(to_millis),
                round.completed_at.map(to_millis),
                expected.as_str(),
            ],
        )?;

        Ok(changed > 0)
    }

    async fn add_confirmation(&self, round_id: Uuid, member_id: &str) -> Result<Confirmation> {
        // Read-check-write under one connection lock
        let conn = self.storage.get_connection().await;

        let round = load_round(&conn, "id = ?1", params![round_id.to_string()])?;
        let mut round = match round {
            Some(round) if round.status == RoundStatus::Confirming => round,
            _ => return Ok(Confirmation::Closed),
        };

        if round.is_confirmed(member_id) {
            return Ok(Confirmation::AlreadyConfirmed(round));
        }

        round.confirmed_members.push(member_id.to_string());
        conn.execute(
            "UPDATE lottery_rounds SET confirmed_members = ?2 WHERE id = ?1 AND status = ?3",
            params![
                round_id.to_string(),
                serde_json::to_string(&round.confirmed_members)?,
                RoundStatus::Confirming.as_str(),
            ],
        )?;

        Ok(Confirmation::Added(round))
    }

    async fn find_by_id(&self, round_id: Uuid) -> Result<Option<LotteryRound>> {
        let conn = self.storage.get_connection().await;
        load_round(&conn, "id = ?1", params![round_id.to_string()])
    }

    async fn find_by_status(&self, group_id: &str, status: RoundStatus) -> Result<Option<LotteryRound>> {
        let conn = self.storage.get_connection().await;
        load_round(
            &conn,
            "group_id = ?1 AND status = ?2 ORDER BY created_at DESC, rowid DESC",
            params![group_id, status.as_str()],
        )
    }

    async fn find_active(&self, group_id: &str) -> Result<Option<LotteryRound>> {
        let conn = self.storage.get_connection().await;
        load_round(
            &conn,
            "group_id = ?1 AND status IN ('confirming', 'countdown', 'spinning')",
            params![group_id],
        )
    }

    async fn find_latest(&self, group_id: &str) -> Result<Option<LotteryRound>> {
        let conn = self.storage.get_connection().await;
        load_round(
            &conn,
            "group_id = ?1 ORDER BY created_at DESC, rowid DESC",
            params![group_id],
        )
    }

    async fn find_revealing(&self) -> Result<Vec<LotteryRound>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lottery_rounds WHERE status IN ('countdown', 'spinning')
             ORDER BY created_at, rowid",
            ROUND_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], RoundRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RoundRow::into_round).collect()
    }
}
