//! Core business logic module
//!
//! Job model, engine contract, progress normalization, bookkeeping and the
//! download manager tying them together.

pub mod config;
pub mod engine;
pub mod events;
pub mod manager;
pub mod models;
pub mod options;
pub mod progress_adapter;
pub mod store;
pub mod ytdlp;


#[cfg(test)]
mod config_test;

// Re-export commonly used types
pub use config::AppConfig;
pub use engine::{Engine, EngineEvent, EngineFailure, EventSink, Metadata};
pub use events::{Inbox, JobCallbacks, JobEvent};
pub use manager::DownloadManager;
pub use models::{AppError, AppResult, DownloadStats, JobId, JobRecord, JobStatus};
pub use options::{AudioFormat, EngineConfig, ImportReport, Options};
pub use ytdlp::YtDlpEngine;
