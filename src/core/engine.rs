//! Extraction engine contract
//!
//! The engine performs the actual media extraction, transfer and post-processing.
//! The orchestrator only relies on the blocking call below and on the events the
//! engine pushes into its [`EventSink`] while that call runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::options::EngineConfig;

/// Stage reported by an engine progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Bytes are being transferred
    Downloading,
    /// Transfer finished, post-processing is about to start
    Finished,
    /// Any phase the orchestrator does not interpret (e.g. "error", "postprocessing")
    Other(String),
}

impl Phase {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "downloading" => Phase::Downloading,
            "finished" => Phase::Finished,
            other => Phase::Other(other.to_string()),
        }
    }
}

/// One raw progress event. Every payload field is optional: what is present
/// depends on the phase and on what the extractor knows about the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub phase: Phase,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    pub title: Option<String>,
}

impl EngineEvent {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            speed: None,
            title: None,
        }
    }

    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            downloaded_bytes: Some(downloaded_bytes),
            total_bytes,
            ..Self::new(Phase::Downloading)
        }
    }

    pub fn finished() -> Self {
        Self::new(Phase::Finished)
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.total_bytes_estimate = Some(estimate);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Information the engine resolved for a successful download
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub ext: Option<String>,
}

/// Failure surfaced by the engine (network, unsupported URL, post-processing...)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineFailure {
    pub message: String,
}

impl EngineFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EngineFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Receiver of engine progress events
pub trait EventSink {
    fn on_event(&mut self, event: EngineEvent);
}

impl<F> EventSink for F
where
    F: FnMut(EngineEvent),
{
    fn on_event(&mut self, event: EngineEvent) {
        self(event)
    }
}

/// External extract-and-download engine.
///
/// `extract_and_download` blocks for the whole job (network bound, possibly hours);
/// the manager always calls it from a blocking worker thread.
pub trait Engine: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn extract_and_download(
        &self,
        url: &str,
        config: &EngineConfig,
        sink: &mut dyn EventSink,
    ) -> Result<Metadata, EngineFailure>;
}
