// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::crisis::GuardSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// User agent of the hosting client; decides dial intent vs dialog
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// `POST` target for crisis alerts; alerts are dropped when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Optional endpoint receiving every analyzed text
    #[serde(default)]
    pub analysis_endpoint: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            analysis_endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Inputs shorter than this many characters are skipped
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_sample_length")]
    pub sample_length: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Replace the built-in phrase lists
    #[serde(default)]
    pub keywords_path: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            sample_length: default_sample_length(),
            debounce_ms: default_debounce_ms(),
            keywords_path: None,
        }
    }
}

impl DetectionConfig {
    pub fn guard_settings(&self) -> GuardSettings {
        GuardSettings {
            min_length: self.min_length,
            sample_length: self.sample_length,
            debounce: Duration::from_millis(self.debounce_ms),
            ..GuardSettings::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds session.json (session keys) and audit.json (audit logs)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl StorageConfig {
    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.state_dir.join("audit.json")
    }
}

fn default_timeout_secs() -> u64 {
    crate::crisis::alert::ALERT_TIMEOUT_SECS
}

fn default_min_length() -> usize {
    crate::crisis::detector::DEFAULT_MIN_LENGTH
}

fn default_sample_length() -> usize {
    crate::crisis::detector::DEFAULT_SAMPLE_LENGTH
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".crisis-guard"))
        .unwrap_or_else(|| PathBuf::from(".crisis-guard"))
}
