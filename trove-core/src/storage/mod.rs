pub mod group_store;
pub mod notification_store;
pub mod round_store;

pub use group_store::GroupStore;
pub use notification_store::NotificationStore;
pub use round_store::SqliteRoundStore;

use crate::error::{Result, TroveError};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TroveError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        Self::with_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // Groups table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                admin_id TEXT NOT NULL,
                current_round INTEGER NOT NULL DEFAULT 1,
                next_lottery_at INTEGER,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Group members table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS group_members (
                group_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                display_name TEXT,
                slots INTEGER,
                joined_at INTEGER NOT NULL,
                FOREIGN KEY (group_id) REFERENCES groups(id),
                PRIMARY KEY (group_id, member_id)
            )",
            [],
        )?;

        // Notification inbox
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                member_id TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                category TEXT NOT NULL,
                related_id TEXT NOT NULL,
                deep_link TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Lottery rounds table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS lottery_rounds (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                confirmed_members TEXT NOT NULL,
                payout_order TEXT NOT NULL,
                drawn_order TEXT NOT NULL,
                draw_commitment TEXT,
                draw_nonce TEXT,
                selected_id TEXT,
                selected_name TEXT,
                countdown_end INTEGER,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            )",
            [],
        )?;

        // At most one open round per group
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_lottery_rounds_open
             ON lottery_rounds(group_id)
             WHERE status IN ('confirming', 'countdown', 'spinning')",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
