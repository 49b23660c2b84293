use crate::error::Result;
use crate::ports::NotificationPort;
use crate::storage::{from_millis, to_millis, Storage};
use crate::types::Notification;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: String,
    pub notification: Notification,
    pub created_at: DateTime<Utc>,
}

/// Notification inbox; delivery transport is someone else's job
pub struct NotificationStore {
    storage: Arc<Storage>,
}

impl NotificationStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn list_for_member(&self, member_id: &str) -> Result<Vec<StoredNotification>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, member_id, title, body, category, related_id, deep_link, created_at
             FROM notifications WHERE member_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![member_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, member_id, title, body, category, related_id, deep_link, created_at) = row?;
            notifications.push(StoredNotification {
                id,
                notification: Notification {
                    member_id,
                    title,
                    body,
                    category: category.parse()?,
                    related_id,
                    deep_link,
                },
                created_at: from_millis(created_at),
            });
        }

        Ok(notifications)
    }
}

#[async_trait]
impl NotificationPort for NotificationStore {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO notifications (id, member_id, title, body, category, related_id, deep_link, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                notification.member_id,
                notification.title,
                notification.body,
                notification.category.as_str(),
                notification.related_id,
                notification.deep_link,
                to_millis(Utc::now()),
            ],
        )?;

        tracing::debug!(
            "Stored {} notification for member {}",
            notification.category.as_str(),
            notification.member_id
        );
        Ok(())
    }
}
