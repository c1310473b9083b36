//! Runner configuration
//!
//! Configuration for the row driver, loaded from runner.yaml. Every field
//! is defaulted, so an empty file is a valid configuration:
//!
//! ```yaml
//! mode: concurrent
//! batch_size: 4
//!
//! pacing:
//!   step_delay_ms: 1000
//!   row_delay_ms: 3000
//!
//! timeouts:
//!   click_ms: 10000
//!   action_ms: 30000
//!
//! driver:
//!   browser: chromium
//!   headless: false
//!   cdp_endpoint: "http://localhost:9222"
//!
//! output:
//!   prefix: results
//!   json: true
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::loader::LoadError;

/// How rows of a batch are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Resolved scheduling mode handed to the row driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One row at a time, in input order
    Sequential,
    /// Up to `batch_size` rows in flight, each on its own page
    Concurrent { batch_size: usize },
}

/// Fixed delays that keep the target site from being hammered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Wait after every step, regardless of outcome
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Wait between rows
    #[serde(default = "default_row_delay_ms")]
    pub row_delay_ms: u64,
}

fn default_step_delay_ms() -> u64 {
    1000
}

fn default_row_delay_ms() -> u64 {
    3000
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            row_delay_ms: default_row_delay_ms(),
        }
    }
}

impl PacingConfig {
    /// No delays at all (tests, dry runs against local pages)
    pub fn none() -> Self {
        Self {
            step_delay_ms: 0,
            row_delay_ms: 0,
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn row_delay(&self) -> Duration {
        Duration::from_millis(self.row_delay_ms)
    }
}

/// Upper bounds on driver calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per click attempt (primary and fallback selector each get one)
    #[serde(default = "default_click_ms")]
    pub click_ms: u64,

    /// Navigation, fill and condition evaluation
    #[serde(default = "default_action_ms")]
    pub action_ms: u64,
}

fn default_click_ms() -> u64 {
    10_000
}

fn default_action_ms() -> u64 {
    30_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            click_ms: default_click_ms(),
            action_ms: default_action_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn click(&self) -> Duration {
        Duration::from_millis(self.click_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }
}

/// Browser types supported
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        }
    }
}

/// Playwright driver process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Node.js executable
    #[serde(default = "default_node")]
    pub node: String,

    /// Playwright JSON-RPC server script
    #[serde(default = "default_script")]
    pub script: String,

    #[serde(default)]
    pub browser: BrowserType,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Attach to an already running browser (DevTools endpoint) instead of launching one
    #[serde(default)]
    pub cdp_endpoint: Option<String>,
}

fn default_node() -> String {
    "node".to_string()
}

fn default_script() -> String {
    "extensions/playwright/server.js".to_string()
}

fn default_headless() -> bool {
    true
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            script: default_script(),
            browser: BrowserType::default(),
            headless: default_headless(),
            cdp_endpoint: None,
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Report files are written as `<prefix>_<timestamp>.csv`
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Also write the full batch result as JSON
    #[serde(default)]
    pub json: bool,
}

fn default_prefix() -> String {
    "results".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Rows in flight in concurrent mode
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_batch_size() -> usize {
    1
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            batch_size: default_batch_size(),
            pacing: PacingConfig::default(),
            timeouts: TimeoutConfig::default(),
            driver: DriverConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file = path.display().to_string();

        // An empty document deserializes to unit, not to an empty mapping
        let config: RunnerConfig = if content.trim().is_empty() {
            RunnerConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
                file: file.clone(),
                error: e,
            })?
        };

        config
            .validate()
            .map_err(|message| LoadError::Invalid { file, message })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mode == ExecutionMode::Concurrent && self.batch_size == 0 {
            return Err("batch_size must be at least 1 in concurrent mode".to_string());
        }
        Ok(())
    }

    /// Override the batch size; anything above one switches to concurrent mode
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.mode = if self.batch_size > 1 {
            ExecutionMode::Concurrent
        } else {
            ExecutionMode::Sequential
        };
        self
    }

    pub fn batch_mode(&self) -> BatchMode {
        match self.mode {
            ExecutionMode::Sequential => BatchMode::Sequential,
            ExecutionMode::Concurrent => BatchMode::Concurrent {
                batch_size: self.batch_size.max(1),
            },
        }
    }
}
