// Configuration loader
// Loads ~/.crisis-guard/config.toml, then applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;

const ENV_ALERT_URL: &str = "CRISIS_GUARD_ALERT_URL";
const ENV_ANALYSIS_URL: &str = "CRISIS_GUARD_ANALYSIS_URL";
const ENV_STATE_DIR: &str = "CRISIS_GUARD_STATE_DIR";

/// Default location of the config file
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".crisis-guard/config.toml"))
}

/// Load configuration from the default location. A missing file means
/// defaults; a malformed one is an error.
pub fn load_config() -> Result<Config> {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("No home directory, using default configuration");
            Ok(apply_env_overrides(Config::default(), |key| std::env::var(key).ok()))
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        config
    } else {
        Config::default()
    };

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

fn apply_env_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(ENV_ALERT_URL) {
        config.alert.endpoint = Some(url);
    }
    if let Some(url) = non_empty(ENV_ANALYSIS_URL) {
        config.alert.analysis_endpoint = Some(url);
    }
    if let Some(dir) = non_empty(ENV_STATE_DIR) {
        config.storage.state_dir = PathBuf::from(dir);
    }
    config
}
