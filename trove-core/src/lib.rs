//! Trove core - shared types, collaborator ports and local storage
//!
//! The lottery engine talks to the rest of the savings-group product only
//! through the traits in [`ports`]; [`storage`] provides SQLite-backed
//! implementations of them for local use.

pub mod config;
pub mod error;
pub mod ports;
pub mod storage;
pub mod types;

pub use config::LotteryConfig;
pub use error::{Result, TroveError};
pub use ports::{
    BroadcastPort, Confirmation, GroupSchedulePort, MembershipPort, NotificationPort, RoundStore,
};
pub use storage::{GroupStore, NotificationStore, SqliteRoundStore, Storage};
pub use types::{
    GroupInfo, GroupMember, LotteryRound, Notification, NotificationCategory, RoundSnapshot,
    RoundStatus,
};
