//! Application settings and paths.
//!
//! Settings live in an XDG-compliant JSON file. A missing file means
//! defaults; a present file may set any subset of the fields.

use crate::engine::EngineConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::scanner::ScanTechnique;
use crate::timing::TimingProfile;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/cyberscan)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Locate the configuration directory. Nothing is created.
    pub fn resolve() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "cyberscan", "cyberscan")
            .ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Port specification used when none is given.
    pub default_ports: String,
    /// Technique used when none is given.
    pub default_technique: ScanTechnique,
    /// Timing tier used when none is given.
    pub default_timing: TimingProfile,
    /// Upper bound on concurrent probes.
    pub pool_capacity: usize,
    /// Grace period for in-flight probes after a stop, in milliseconds.
    pub stop_grace_ms: u64,
    /// Interval between progress events, in milliseconds.
    pub progress_interval_ms: u64,
    /// OS fingerprinting executable.
    pub os_tool: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_ports: "1-1000".to_string(),
            default_technique: ScanTechnique::Connect,
            default_timing: TimingProfile::Normal,
            pool_capacity: 1024,
            stop_grace_ms: 5000,
            progress_interval_ms: 250,
            os_tool: "nmap".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from the default location.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::resolve()?.settings_file();

        if !file.exists() {
            debug!(path = %file.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let settings: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        settings.validate()?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Save settings to the default location.
    pub fn save(&self) -> ConfigResult<PathBuf> {
        let paths = Paths::resolve()?;
        fs::create_dir_all(&paths.config_dir)?;
        let file = paths.settings_file();
        self.save_to(&file)?;
        Ok(file)
    }

    /// Save settings to a specific file.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.pool_capacity == 0 {
            return Err(ConfigError::InvalidFormat(
                "pool_capacity must be at least 1".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::InvalidFormat(
                "progress_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine settings derived from these.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            pool_capacity: self.pool_capacity,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            os_tool: self.os_tool.clone(),
        }
    }
}
