//! Application configuration management

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::options::Options;

/// Environment variables with this prefix override file values,
/// e.g. `MEDIA_DOWNLOADER__MANAGER__MAX_CONCURRENT_JOBS=2`
pub const ENV_PREFIX: &str = "MEDIA_DOWNLOADER";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main application configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub options: Options,
    pub manager: ManagerSettings,
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
}

/// Download manager tuning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Upper bound on jobs talking to the engine at once; `None` runs every job immediately
    pub max_concurrent_jobs: Option<usize>,
}

/// How to reach the yt-dlp executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub yt_dlp_path: PathBuf,
    /// Appended verbatim before the URL
    pub extra_args: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            yt_dlp_path: PathBuf::from(if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" }),
            extra_args: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let existed = config_path.exists();
        let config = Self::load_from(&config_path)?;

        if existed {
            tracing::info!("Loaded configuration from: {:?}", config_path);
        } else {
            config.save_to(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);
        }
        Ok(config)
    }

    /// Load from a JSON file (optional) layered under environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        settings
            .try_deserialize::<AppConfig>()
            .with_context(|| "Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "mediadownloader", "media-downloader")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<Self> {
        let config = Self::default();
        config.save()?;
        tracing::info!("Reset configuration to defaults");
        Ok(config)
    }

    /// Validate the settings the core depends on. Job options are left to the engine.
    pub fn validate(&self) -> Result<()> {
        if self.manager.max_concurrent_jobs == Some(0) {
            bail!("manager.max_concurrent_jobs must be greater than 0 when set");
        }
        if self.engine.yt_dlp_path.as_os_str().is_empty() {
            bail!("engine.yt_dlp_path must not be empty");
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            bail!("logging.level must be one of {:?}", LOG_LEVELS);
        }
        Ok(())
    }
}
