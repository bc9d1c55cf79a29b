use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Facts about the Rectangle application itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub install_path: PathBuf,
    /// Bundle directory name searched for in the process list
    pub bundle_name: String,
    pub bundle_id: String,
    /// Preference domain used with `defaults`
    pub defaults_domain: String,
    pub url_scheme: String,
    pub website_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            install_path: PathBuf::from("/Applications/Rectangle.app"),
            bundle_name: "Rectangle.app".to_string(),
            bundle_id: "com.knollsoft.Rectangle".to_string(),
            defaults_domain: "com.knollsoft.Rectangle".to_string(),
            url_scheme: "rectangle".to_string(),
            website_url: "https://rectangleapp.com/".to_string(),
        }
    }
}

/// Locations of the system tools the bridge shells out to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub mdls: PathBuf,
    pub defaults: PathBuf,
    pub open: PathBuf,
    pub ps: PathBuf,
    pub brew: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mdls: PathBuf::from("/usr/bin/mdls"),
            defaults: PathBuf::from("/usr/bin/defaults"),
            open: PathBuf::from("/usr/bin/open"),
            ps: PathBuf::from("/bin/ps"),
            brew: PathBuf::from("/opt/homebrew/bin/brew"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Seconds between two background detections
    pub interval_secs: u64,
    /// Backoff applied to each locate step
    pub retry: RetryPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            retry: RetryPolicy::default(),
        }
    }
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub timeout_ms: u64,
    /// `brew install` downloads, so it gets its own generous bound
    pub install_timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            install_timeout_secs: 10 * 60,
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

/// The application hosting the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bundle of the host application, used for the ignore-app suggestion
    pub app_path: Option<PathBuf>,
    /// Refuse to register actions when not running on macOS
    pub require_macos: bool,
    /// Suggest allowing drag-snap for ignored apps once Rectangle is found
    pub suggest_drag_snap: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            app_path: None,
            require_macos: true,
            suggest_drag_snap: true,
        }
    }
}

/// Complete configuration, stored as TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub app: AppConfig,
    pub tools: ToolPaths,
    pub detection: DetectionConfig,
    pub commands: CommandConfig,
    pub host: HostConfig,
}

/// `~/.config/rectangle-bridge/config.toml`
pub fn default_config_path() -> PathBuf {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home_dir
        .join(".config")
        .join("rectangle-bridge")
        .join("config.toml")
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from the default location and apply environment overrides
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut config = Self::load(&default_config_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;

        // Atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(temp_path, path)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(install_path) = std::env::var("RECTANGLE_BRIDGE_INSTALL_PATH") {
            self.app.install_path = PathBuf::from(install_path);
        }

        if let Ok(host_app) = std::env::var("RECTANGLE_BRIDGE_HOST_APP") {
            self.host.app_path = Some(PathBuf::from(host_app));
        }

        if let Ok(interval) = std::env::var("RECTANGLE_BRIDGE_DETECTION_INTERVAL_SECS") {
            if let Ok(parsed) = interval.parse() {
                self.detection.interval_secs = parsed;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection
            .retry
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if self.detection.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "detection.interval_secs must be positive".to_string(),
            ));
        }
        if self.commands.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "commands.timeout_ms must be positive".to_string(),
            ));
        }
        if self.app.url_scheme.is_empty() || self.app.url_scheme.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "app.url_scheme '{}' is not a bare scheme name",
                self.app.url_scheme
            )));
        }
        Ok(())
    }
}
