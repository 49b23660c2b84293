use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use trove_core::LotteryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trove"),
            verbose: false,
        }
    }
}

impl CliConfig {
    pub fn new(data_dir: Option<PathBuf>, verbose: bool) -> Self {
        let mut config = Self::default();
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        config.verbose = verbose;
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("trove.db")
    }

    fn lottery_config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// `config.json` in the data directory, or defaults when it is absent
    pub fn lottery_config(&self) -> trove_core::Result<LotteryConfig> {
        LotteryConfig::load(&self.lottery_config_path())
    }
}
