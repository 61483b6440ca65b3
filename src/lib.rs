//! Media Downloader - Core Library
//!
//! Concurrent yt-dlp job orchestration: options translation, progress
//! normalization, in-flight/history bookkeeping and observer delivery.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::AppConfig,
    engine::{Engine, EngineEvent, EngineFailure, EventSink, Metadata},
    events::{Inbox, JobCallbacks, JobEvent},
    manager::DownloadManager,
    models::{AppError, AppResult, DownloadStats, JobId, JobRecord, JobStatus},
    options::{AudioFormat, ImportReport, Options},
    ytdlp::YtDlpEngine,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Load the persisted configuration, falling back to defaults when it is
/// unreadable or invalid
pub fn load_or_initialize_config() -> AppConfig {
    match AppConfig::load() {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                tracing::warn!(
                    "Invalid configuration detected ({}), falling back to defaults",
                    err
                );
                AppConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            tracing::warn!(
                "Failed to load configuration from disk: {}. Using defaults",
                err
            );
            AppConfig::default()
        }
    }
}

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    utils::logging::init_tracing("info");
    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}
