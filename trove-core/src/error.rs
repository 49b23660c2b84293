use thiserror::Error;

pub type Result<T> = std::result::Result<T, TroveError>;

#[derive(Error, Debug)]
pub enum TroveError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: String },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TroveError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn broadcast(msg: impl Into<String>) -> Self {
        Self::Broadcast(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn group_not_found(group_id: impl Into<String>) -> Self {
        Self::GroupNotFound {
            group_id: group_id.into(),
        }
    }
}
