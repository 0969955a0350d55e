use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ScreenFlowError, ScreenFlowResult};

const CONFIG_FILE: &str = "screenflow.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL of the device automation agent (falls back to env var SCREENFLOW_DEVICE_ENDPOINT).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:9008".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// How a post-action screen reading is compared with what the edge expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Foreground package and screen must be unchanged from the pre-action state.
    #[default]
    Unchanged,
    /// Foreground package and screen must equal the planned next state.
    Expected,
    /// Full node identification, match selectors included, must name the edge target.
    Strict,
}

/// Retry counts and delays used while talking to the live device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_retries")]
    pub discovery_retries: u32,
    #[serde(default = "default_backoff")]
    pub discovery_backoff_ms: u64,
    #[serde(default = "default_retries")]
    pub verification_retries: u32,
    #[serde(default = "default_backoff")]
    pub verification_backoff_ms: u64,
    /// Pause after an edge's operation before verification starts.
    #[serde(default = "default_settle")]
    pub settle_delay_ms: u64,
    /// Pause between focusing an input and typing into it.
    #[serde(default = "default_focus")]
    pub focus_delay_ms: u64,
    #[serde(default = "default_child")]
    pub sequential_delay_ms: u64,
    #[serde(default)]
    pub verification: VerificationMode,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            discovery_retries: default_retries(),
            discovery_backoff_ms: default_backoff(),
            verification_retries: default_retries(),
            verification_backoff_ms: default_backoff(),
            settle_delay_ms: default_settle(),
            focus_delay_ms: default_focus(),
            sequential_delay_ms: default_child(),
            verification: VerificationMode::default(),
        }
    }
}

impl TimingConfig {
    /// Same retry counts, every delay set to zero. Used for dry runs and tests.
    pub fn without_delays() -> Self {
        Self {
            discovery_backoff_ms: 0,
            verification_backoff_ms: 0,
            settle_delay_ms: 0,
            focus_delay_ms: 0,
            sequential_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn discovery_backoff(&self) -> Duration {
        Duration::from_millis(self.discovery_backoff_ms)
    }

    pub fn verification_backoff(&self) -> Duration {
        Duration::from_millis(self.verification_backoff_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn focus_delay(&self) -> Duration {
        Duration::from_millis(self.focus_delay_ms)
    }

    pub fn sequential_delay(&self) -> Duration {
        Duration::from_millis(self.sequential_delay_ms)
    }
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> u64 {
    1000
}

fn default_settle() -> u64 {
    1500
}

fn default_focus() -> u64 {
    300
}

fn default_child() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directories scanned for application documents (`*.json`).
    #[serde(default = "default_store_dirs")]
    pub directories: Vec<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directories: default_store_dirs(),
        }
    }
}

fn default_store_dirs() -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Some(base) = dirs::config_dir() {
        found.push(base.join("screenflow").join("apps"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        found.push(cwd.join("apps"));
    }
    found
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JournalConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Overrides the platform data directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn resolve_config_path() -> ScreenFlowResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ScreenFlowError::Config(format!(
        "{CONFIG_FILE} not found next to executable or in working directory"
    )))
}

pub fn parse_config(content: &str) -> ScreenFlowResult<AppConfig> {
    let mut config: AppConfig = toml::from_str(content)?;
    if let Ok(endpoint) = std::env::var("SCREENFLOW_DEVICE_ENDPOINT") {
        config.device.endpoint = endpoint;
    }
    Ok(config)
}

/// Loads `screenflow.toml`, falling back to defaults when no file exists.
pub fn load_config() -> ScreenFlowResult<AppConfig> {
    let _ = dotenvy::dotenv();
    match resolve_config_path() {
        Ok(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config = parse_config(&content)?;
            tracing::info!(path = %path.display(), endpoint = %config.device.endpoint, "config loaded");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "using default settings");
            parse_config("")
        }
    }
}
