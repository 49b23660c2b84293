use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LotteryError>;

#[derive(Error, Debug)]
pub enum LotteryError {
    #[error("Trove core error: {0}")]
    Core(#[from] trove_core::TroveError),

    #[error("No active confirmation phase for group {0}")]
    NoActiveConfirmation(String),

    #[error("No members confirmed")]
    NoConfirmedMembers,

    #[error("Group {0} has no members")]
    NoGroupMembers(String),

    #[error("Member {member_id} does not belong to group {group_id}")]
    NotGroupMember { member_id: String, group_id: String },

    #[error("A lottery round is already in progress for group {0}")]
    RoundInProgress(String),

    #[error("Selection already started for round {0}")]
    SelectionAlreadyStarted(Uuid),

    #[error("Round not found: {0}")]
    RoundNotFound(Uuid),

    #[error("Invalid round state: {0}")]
    InvalidState(String),
}

impl LotteryError {
    /// Storage and other collaborator failures may clear up on their own
    pub fn is_retryable(&self) -> bool {
        matches!(self, LotteryError::Core(_))
    }
}
