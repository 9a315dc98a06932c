use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Occupancy display mode for bubbles. Matches the values the automatic
/// passenger counting feed is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ApcMode {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "OCCUPANCY")]
    Occupancy,
    #[serde(rename = "LOADFACTOR")]
    LoadFactor,
    #[serde(rename = "PASSENGERCOUNT")]
    PassengerCount,
    #[serde(rename = "LOADFACTORPASSENGERCOUNT")]
    LoadFactorPassengerCount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Interval in seconds between content refreshes of the open bubble
    /// (default: 30)
    #[serde(default = "Config::default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Age in seconds past which realtime data is flagged stale
    /// (default: 120)
    #[serde(default = "Config::default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
    /// Occupancy display mode (default: NONE)
    #[serde(default = "Config::default_apc_mode")]
    pub apc_mode: ApcMode,
    /// Debug clock override, epoch milliseconds. When set it is passed to
    /// the feed as the `time` query parameter on every refresh.
    #[serde(default)]
    pub time_override_ms: Option<i64>,
    /// Append the vehicle's short id to each arrival line in stop bubbles
    /// (default: false)
    #[serde(default)]
    pub show_vehicle_id_in_stop_popup: bool,
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "Config::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// HTTP connect timeout in seconds (default: 10)
    #[serde(default = "Config::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: Self::default_refresh_interval_secs(),
            stale_timeout_secs: Self::default_stale_timeout_secs(),
            apc_mode: Self::default_apc_mode(),
            time_override_ms: None,
            show_vehicle_id_in_stop_popup: false,
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn default_refresh_interval_secs() -> u64 {
        30
    }
    fn default_stale_timeout_secs() -> u64 {
        120
    }
    fn default_apc_mode() -> ApcMode {
        ApcMode::None
    }
    fn default_fetch_timeout_secs() -> u64 {
        30
    }
    fn default_connect_timeout_secs() -> u64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_fields() {
        let config: Config = serde_yaml::from_str("apc_mode: LOADFACTOR").unwrap();
        assert_eq!(config.apc_mode, ApcMode::LoadFactor);
        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(config.stale_timeout_secs, 120);
        assert!(config.time_override_ms.is_none());
        assert!(!config.show_vehicle_id_in_stop_popup);
    }

    #[test]
    fn apc_mode_parses_feed_spelling() {
        let config: Config =
            serde_yaml::from_str("apc_mode: LOADFACTORPASSENGERCOUNT").unwrap();
        assert_eq!(config.apc_mode, ApcMode::LoadFactorPassengerCount);
    }
}
