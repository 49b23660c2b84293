use crate::error::{Result, TroveError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Durations are written as seconds in `config.json` (fractions allowed)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Visible countdown before the wheel starts spinning
    #[serde(with = "seconds")]
    pub countdown: Duration,
    /// Spin animation length before the full order is revealed
    #[serde(with = "seconds")]
    pub spin_duration: Duration,
    #[serde(with = "seconds")]
    pub scheduler_interval: Duration,
    /// Confirmed members needed for an unattended start
    pub minimum_quorum: usize,
    pub broadcast_capacity: usize,
    pub deep_link: String,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(10),
            spin_duration: Duration::from_secs(5),
            scheduler_interval: Duration::from_secs(60), // every minute
            minimum_quorum: 3,
            broadcast_capacity: 64,
            deep_link: "trove://lottery".to_string(),
        }
    }
}

impl LotteryConfig {
    /// Load from a JSON file, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.minimum_quorum == 0 {
            return Err(TroveError::config("Minimum quorum must be at least 1"));
        }

        if self.broadcast_capacity == 0 {
            return Err(TroveError::config(
                "Broadcast capacity must be greater than 0",
            ));
        }

        if self.scheduler_interval.is_zero() {
            return Err(TroveError::config(
                "Scheduler interval must be greater than 0",
            ));
        }

        if self.deep_link.is_empty() {
            return Err(TroveError::config("Deep link cannot be empty"));
        }

        Ok(())
    }
}

mod seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = LotteryConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.minimum_quorum, 3);
        assert_eq!(config.countdown, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"minimum_quorum": 5}"#).unwrap();

        let config = LotteryConfig::load(&path).unwrap();
        assert_eq!(config.minimum_quorum, 5);
        assert_eq!(config.deep_link, "trove://lottery");
    }

    #[test]
    fn test_durations_load_as_seconds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"countdown": 30, "spin_duration": 2.5, "scheduler_interval": 15}"#,
        )
        .unwrap();

        let config = LotteryConfig::load(&path).unwrap();
        assert_eq!(config.countdown, Duration::from_secs(30));
        assert_eq!(config.spin_duration, Duration::from_millis(2500));
        assert_eq!(config.scheduler_interval, Duration::from_secs(15));

        let written = serde_json::to_value(&config).unwrap();
        assert_eq!(written["countdown"], 30.0);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"countdown": -1}"#).unwrap();

        assert!(matches!(
            LotteryConfig::load(&path),
            Err(TroveError::Serialization(_))
        ));
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let config = LotteryConfig {
            minimum_quorum: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TroveError::Config(_))));
    }
}
