use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{clog_debug, Error, Result};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Polling cadences and debounce floors, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    pub tree_ms: u64,
    pub tasks_ms: u64,
    /// Task status corroboration while the observed job is running.
    pub task_status_ms: u64,
    pub job_probe_ms: u64,
    pub tree_debounce_ms: u64,
    pub task_debounce_ms: u64,
    pub reconnect_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            tree_ms: 3000,
            tasks_ms: 5000,
            task_status_ms: 2000,
            job_probe_ms: 3000,
            tree_debounce_ms: 1000,
            task_debounce_ms: 2000,
            reconnect_ms: 5000,
        }
    }
}

impl CadenceConfig {
    pub fn tree(&self) -> Duration {
        Duration::from_millis(self.tree_ms)
    }

    pub fn tasks(&self) -> Duration {
        Duration::from_millis(self.tasks_ms)
    }

    pub fn task_status(&self) -> Duration {
        Duration::from_millis(self.task_status_ms)
    }

    pub fn job_probe(&self) -> Duration {
        Duration::from_millis(self.job_probe_ms)
    }

    pub fn tree_debounce(&self) -> Duration {
        Duration::from_millis(self.tree_debounce_ms)
    }

    pub fn task_debounce(&self) -> Duration {
        Duration::from_millis(self.task_debounce_ms)
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

/// Geometry used by both layout engines, in canvas units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub horizontal_spacing: f64,
    pub child_spacing: f64,
    pub column_spacing: f64,
    pub row_height: f64,
    pub top_margin: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: 300.0,
            child_spacing: 150.0,
            column_spacing: 350.0,
            row_height: 120.0,
            top_margin: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub ws_url: String,
    /// Gates background polling and push reconnects.
    pub auto_refresh: bool,
    pub request_timeout_ms: u64,
    pub cadence: CadenceConfig,
    pub layout: LayoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            auto_refresh: true,
            request_timeout_ms: 10_000,
            cadence: CadenceConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Config {
    pub fn canopy_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".canopy"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::canopy_dir()?.join("canopy.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        clog_debug!(
            "Config loaded: api_base={} ws_url={} auto_refresh={}",
            config.api_base,
            config.ws_url,
            config.auto_refresh
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                clog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Zero cadences would spin the interval timers.
    pub fn validate(&self) -> Result<()> {
        let c = &self.cadence;
        let cadences = [
            ("tree_ms", c.tree_ms),
            ("tasks_ms", c.tasks_ms),
            ("task_status_ms", c.task_status_ms),
            ("job_probe_ms", c.job_probe_ms),
            ("reconnect_ms", c.reconnect_ms),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(Error::Validation(format!("cadence.{} must be > 0", name)));
            }
        }
        if self.api_base.trim().is_empty() {
            return Err(Error::Validation("api_base must not be empty".to_string()));
        }
        Ok(())
    }
}
