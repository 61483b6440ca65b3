//! Progress adapter
//!
//! Normalizes the engine's heterogeneous progress events into [`JobRecord`]
//! updates. The adapter is the engine's event sink for one job: it owns the
//! working copy of the record while the engine call runs and hands every
//! observable change to a [`ProgressPublisher`].

use tracing::debug;

use crate::core::engine::{EngineEvent, EventSink, Phase};
use crate::core::models::{JobRecord, JobStatus};

/// Destination of normalized progress updates
pub trait ProgressPublisher {
    /// Publish a progress snapshot. Returns `false` once the job is no longer
    /// tracked (it was cancelled), after which the adapter stops publishing.
    fn publish(&self, record: &JobRecord) -> bool;
}

/// Percentage of the transfer, if the event carries a usable denominator.
///
/// A known total wins over the estimate; zero denominators count as absent.
pub fn transfer_percent(event: &EngineEvent) -> Option<f64> {
    let downloaded = event.downloaded_bytes?;
    let total = event
        .total_bytes
        .filter(|total| *total > 0)
        .or(event.total_bytes_estimate.filter(|estimate| *estimate > 0))?;
    Some(downloaded as f64 / total as f64 * 100.0)
}

/// Apply one engine event to the record.
///
/// Returns whether observers should be notified. Unknown phases and events for
/// terminal records never change anything.
pub fn apply_event(record: &mut JobRecord, event: &EngineEvent) -> bool {
    if record.is_terminal() {
        return false;
    }

    match event.phase {
        Phase::Downloading => {
            if let Some(title) = event.title.as_deref().filter(|t| !t.is_empty()) {
                record.title = title.to_string();
            }
            if let Some(speed) = event.speed {
                record.speed_bytes_per_sec = Some(speed);
            }

            // A later transfer of the same job (next playlist item, second stream
            // of a merged format) keeps the job in processing; the bar tracks the
            // transfer currently running.
            if record.status == JobStatus::Processing {
                if let Some(percent) = transfer_percent(event) {
                    record.progress_percent = percent.clamp(0.0, 100.0);
                }
                return true;
            }

            record.status = JobStatus::Downloading;
            if let Some(percent) = transfer_percent(event) {
                record.progress_percent = percent.clamp(0.0, 100.0).max(record.progress_percent);
            }
            true
        }
        Phase::Finished => {
            if let Some(title) = event.title.as_deref().filter(|t| !t.is_empty()) {
                record.title = title.to_string();
            }
            if record.status == JobStatus::Processing {
                let changed = record.progress_percent < 100.0;
                record.progress_percent = 100.0;
                return changed;
            }
            record.status = JobStatus::Processing;
            record.progress_percent = 100.0;
            true
        }
        Phase::Other(ref phase) => {
            debug!("Ignoring engine phase {:?} for {}", phase, record.url);
            false
        }
    }
}

/// Event sink bound to one job
pub struct ProgressAdapter<'a, P: ProgressPublisher + ?Sized> {
    record: JobRecord,
    publisher: &'a P,
    detached: bool,
}

impl<'a, P: ProgressPublisher + ?Sized> ProgressAdapter<'a, P> {
    pub fn new(record: JobRecord, publisher: &'a P) -> Self {
        Self {
            record,
            publisher,
            detached: false,
        }
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    /// Whether the job was dropped from bookkeeping while the engine ran
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn into_record(self) -> JobRecord {
        self.record
    }
}

impl<P: ProgressPublisher + ?Sized> EventSink for ProgressAdapter<'_, P> {
    fn on_event(&mut self, event: EngineEvent) {
        if self.detached {
            return;
        }
        if apply_event(&mut self.record, &event) && !self.publisher.publish(&self.record) {
            debug!(
                "Job {} is no longer in flight, dropping further progress",
                self.record.id
            );
            self.detached = true;
        }
    }
}
