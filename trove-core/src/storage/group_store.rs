use crate::error::{Result, TroveError};
use crate::ports::{GroupSchedulePort, MembershipPort};
use crate::storage::{from_millis, to_millis, Storage};
use crate::types::{GroupInfo, GroupMember};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

/// Local group directory: groups, their members and lottery schedules
pub struct GroupStore {
    storage: Arc<Storage>,
}

impl GroupStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn create_group(&self, name: &str, admin_id: &str, current_round: u32) -> Result<GroupInfo> {
        let conn = self.storage.get_connection().await;

        let group = GroupInfo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            admin_id: admin_id.to_string(),
            current_round,
            next_lottery_at: None,
        };

        conn.execute(
            "INSERT INTO groups (id, name, admin_id, current_round, next_lottery_at, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            params![
                group.id,
                group.name,
                group.admin_id,
                group.current_round,
                to_millis(Utc::now()),
            ],
        )?;

        tracing::info!("Created group '{}' with ID: {}", name, group.id);
        Ok(group)
    }

    pub async fn add_member(&self, group_id: &str, member: &GroupMember) -> Result<()> {
        let conn = self.storage.get_connection().await;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM groups WHERE id = ?1",
            params![group_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(TroveError::group_not_found(group_id));
        }

        conn.execute(
            "INSERT OR REPLACE INTO group_members (group_id, member_id, display_name, slots, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group_id,
                member.member_id,
                member.display_name,
                member.slots,
                to_millis(Utc::now()),
            ],
        )?;

        Ok(())
    }

    pub async fn schedule_lottery(&self, group_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.storage.get_connection().await;

        let changed = conn.execute(
            "UPDATE groups SET next_lottery_at = ?2 WHERE id = ?1",
            params![group_id, to_millis(at)],
        )?;
        if changed == 0 {
            return Err(TroveError::group_not_found(group_id));
        }

        Ok(())
    }
}

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupInfo> {
    Ok(GroupInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        admin_id: row.get(2)?,
        current_round: row.get(3)?,
        next_lottery_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
    })
}

#[async_trait]
impl MembershipPort for GroupStore {
    async fn group(&self, group_id: &str) -> Result<GroupInfo> {
        let conn = self.storage.get_connection().await;

        conn.query_row(
            "SELECT id, name, admin_id, current_round, next_lottery_at FROM groups WHERE id = ?1",
            params![group_id],
            group_from_row,
        )
        .optional()?
        .ok_or_else(|| TroveError::group_not_found(group_id))
    }

    async fn members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT member_id, display_name, slots FROM group_members
             WHERE group_id = ?1 ORDER BY joined_at ASC, rowid ASC",
        )?;

        let member_iter = stmt.query_map(params![group_id], |row| {
            Ok(GroupMember {
                member_id: row.get(0)?,
                display_name: row.get(1)?,
                slots: row.get(2)?,
            })
        })?;

        let mut members = Vec::new();
        for member in member_iter {
            members.push(member?);
        }

        Ok(members)
    }

    async fn display_name(&self, member_id: &str) -> Result<Option<String>> {
        let conn = self.storage.get_connection().await;

        let name: Option<Option<String>> = conn
            .query_row(
                "SELECT display_name FROM group_members WHERE member_id = ?1 AND display_name IS NOT NULL LIMIT 1",
                params![member_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(name.flatten())
    }
}

#[async_trait]
impl GroupSchedulePort for GroupStore {
    async fn due_groups(&self, now: DateTime<Utc>) -> Result<Vec<GroupInfo>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, name, admin_id, current_round, next_lottery_at FROM groups
             WHERE next_lottery_at IS NOT NULL AND next_lottery_at <= ?1
             ORDER BY next_lottery_at ASC",
        )?;

        let group_iter = stmt.query_map(params![to_millis(now)], group_from_row)?;

        let mut groups = Vec::new();
        for group in group_iter {
            groups.push(group?);
        }

        Ok(groups)
    }

    async fn clear_schedule(&self, group_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE groups SET next_lottery_at = NULL WHERE id = ?1",
            params![group_id],
        )?;

        Ok(())
    }
}
