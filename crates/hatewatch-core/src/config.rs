use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use crate::error::{HatewatchError, Result};
use crate::profile::HostProfile;

pub const DEFAULT_API_URL: &str = "https://fesg1234-hate-camer.hf.space/detect-hate";
pub const API_URL_ENV: &str = "HATEWATCH_API_URL";

/// Delays and periods of the change-detection engine, in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    /// Trailing-edge window for scans triggered by new messages
    pub scan_debounce_ms: u64,
    /// Settle time before re-resolving the conversation after a header change
    pub header_settle_ms: u64,
    /// Settle time after the navigation locator changed
    pub navigation_settle_ms: u64,
    /// Delay before rescanning a newly entered conversation
    pub rescan_after_change_ms: u64,
    pub watchdog_interval_ms: u64,
    /// Quiet period required before the watchdog sweeps
    pub quiet_threshold_ms: u64,
    pub ready_poll_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            scan_debounce_ms: 300,
            header_settle_ms: 300,
            navigation_settle_ms: 500,
            rescan_after_change_ms: 500,
            watchdog_interval_ms: 8000,
            quiet_threshold_ms: 10000,
            ready_poll_ms: 1000,
        }
    }
}

impl Timing {
    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }

    pub fn header_settle(&self) -> Duration {
        Duration::from_millis(self.header_settle_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn rescan_after_change(&self) -> Duration {
        Duration::from_millis(self.rescan_after_change_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn quiet_threshold(&self) -> Duration {
        Duration::from_millis(self.quiet_threshold_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    /// Shown when the service flags a message without a suggestion
    pub default_suggestion: String,
    pub timing: Timing,
    pub profile: HostProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            default_suggestion: "Please express yourself more respectfully".to_string(),
            timing: Timing::default(),
            profile: HostProfile::default(),
        }
    }

    /// Loads the user config, falling back to defaults when none exists.
    /// The API URL from the environment takes precedence over the file.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HatewatchError::config("Could not determine config directory"))?;

        Ok(config_dir.join("hatewatch").join("config.json"))
    }
}
