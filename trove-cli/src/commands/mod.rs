pub mod group;
pub mod inbox;
pub mod lottery;
pub mod scheduler;

pub use group::{handle_group_command, GroupCommands};
pub use inbox::show_notifications;
pub use lottery::{handle_lottery_command, LotteryCommands};
pub use scheduler::{handle_scheduler_command, SchedulerCommands};

use crate::config::CliConfig;
use std::sync::Arc;
use trove_core::{GroupStore, LotteryConfig, NotificationStore, Storage};
use trove_lottery::{BroadcastHub, LotteryEngine};

/// Everything a command needs, opened once per invocation
pub struct Context {
    pub groups: Arc<GroupStore>,
    pub notifications: NotificationStore,
    pub hub: Arc<BroadcastHub>,
    pub engine: LotteryEngine,
}

impl Context {
    pub async fn open(cli: &CliConfig) -> anyhow::Result<Self> {
        let config: LotteryConfig = cli.lottery_config()?;
        let storage = Arc::new(Storage::new(&cli.db_path()).await?);
        let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));

        tracing::debug!("Opened trove database at {}", cli.db_path().display());

        Ok(Self {
            groups: Arc::new(GroupStore::new(storage.clone())),
            notifications: NotificationStore::new(storage.clone()),
            engine: trove_lottery::local_engine(storage, hub.clone(), config),
            hub,
        })
    }
}
