//! In-flight and history bookkeeping
//!
//! `JobStore` is plain data; the manager keeps it behind a single mutex so every
//! operation here is atomic with respect to submissions, completions and cancels.

use serde::Serialize;

use crate::core::models::{AppError, AppResult, DownloadStats, JobId, JobRecord, JobStatus};

/// Point-in-time copy of the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobsSnapshot {
    pub in_flight: Vec<JobRecord>,
    pub history: Vec<JobRecord>,
    pub stats: DownloadStats,
}

#[derive(Debug, Default)]
pub struct JobStore {
    in_flight: Vec<JobRecord>,
    /// Append-only, in terminal-transition order
    history: Vec<JobRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. URLs are unique within the in-flight set.
    pub fn add_in_flight(&mut self, record: JobRecord) -> AppResult<()> {
        if self.in_flight.iter().any(|r| r.url == record.url) {
            return Err(AppError::DuplicateUrl(record.url));
        }
        self.in_flight.push(record);
        Ok(())
    }

    pub fn is_in_flight(&self, id: JobId) -> bool {
        self.in_flight.iter().any(|r| r.id == id)
    }

    /// Replace the bookkeeping copy of an in-flight job. Returns `false` when the
    /// job has already left the in-flight set.
    pub fn update_in_flight(&mut self, record: &JobRecord) -> bool {
        match self.in_flight.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record.clone();
                true
            }
            None => false,
        }
    }

    /// Move a job that reached a terminal state into history.
    ///
    /// Identity based: if the job is no longer in flight (cancelled meanwhile)
    /// nothing changes and `false` is returned.
    pub fn move_to_history(&mut self, record: JobRecord) -> bool {
        debug_assert!(record.is_terminal());
        match self.in_flight.iter().position(|r| r.id == record.id) {
            Some(index) => {
                self.in_flight.remove(index);
                self.history.push(record);
                true
            }
            None => false,
        }
    }

    /// Cancel the in-flight job for `url`, returning the cancelled record.
    ///
    /// Jobs already post-processing are not cancellable and stay in flight.
    pub fn cancel_by_url(&mut self, url: &str) -> Option<JobRecord> {
        let index = self
            .in_flight
            .iter()
            .position(|r| r.url == url && r.status.is_cancellable())?;
        let mut record = self.in_flight.remove(index);
        record.cancel();
        self.history.push(record.clone());
        Some(record)
    }

    pub fn in_flight(&self) -> &[JobRecord] {
        &self.in_flight
    }

    pub fn history(&self) -> &[JobRecord] {
        &self.history
    }

    pub fn find_in_flight(&self, url: &str) -> Option<&JobRecord> {
        self.in_flight.iter().find(|r| r.url == url)
    }

    pub fn snapshot(&self) -> JobsSnapshot {
        JobsSnapshot {
            in_flight: self.in_flight.clone(),
            history: self.history.clone(),
            stats: self.stats(),
        }
    }

    pub fn stats(&self) -> DownloadStats {
        let count = |status: JobStatus| self.history.iter().filter(|r| r.status == status).count();
        DownloadStats {
            total: self.in_flight.len() + self.history.len(),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Error),
            cancelled: count(JobStatus::Cancelled),
            active: self.in_flight.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> JobRecord {
        JobRecord::new(url, "/tmp")
    }

    #[test]
    fn test_duplicate_in_flight_url_rejected() {
        let mut store = JobStore::new();
        store.add_in_flight(record("https://a")).unwrap();
        assert!(matches!(
            store.add_in_flight(record("https://a")),
            Err(AppError::DuplicateUrl(_))
        ));
        store.add_in_flight(record("https://b")).unwrap();
        assert_eq!(store.in_flight().len(), 2);
    }

    #[test]
    fn test_move_to_history_exactly_once() {
        let mut store = JobStore::new();
        let mut job = record("https://a");
        store.add_in_flight(job.clone()).unwrap();

        job.complete(Some("A".into()), None);
        assert!(store.move_to_history(job.clone()));
        assert!(!store.move_to_history(job.clone()));

        assert!(store.in_flight().is_empty());
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].status, JobStatus::Completed);
    }

    #[test]
    fn test_cancel_then_late_terminal_is_dropped() {
        let mut store = JobStore::new();
        let mut job = record("https://a");
        store.add_in_flight(job.clone()).unwrap();

        let cancelled = store.cancel_by_url("https://a").unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.end_time.is_some());

        // A resubmission for the same URL is a different job
        let replacement = record("https://a");
        store.add_in_flight(replacement.clone()).unwrap();

        job.fail("late failure");
        assert!(!store.move_to_history(job));
        assert!(store.is_in_flight(replacement.id));
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].status, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_unknown_url_is_noop() {
        let mut store = JobStore::new();
        store.add_in_flight(record("https://a")).unwrap();
        assert!(store.cancel_by_url("https://missing").is_none());
        assert!(store.history().is_empty());
        assert_eq!(store.in_flight().len(), 1);
    }

    #[test]
    fn test_processing_job_is_not_cancellable() {
        let mut store = JobStore::new();
        let mut job = record("https://a");
        store.add_in_flight(job.clone()).unwrap();
        job.status = JobStatus::Processing;
        assert!(store.update_in_flight(&job));

        assert!(store.cancel_by_url("https://a").is_none());
        assert!(store.is_in_flight(job.id));
    }

    #[test]
    fn test_stats_total_is_in_flight_plus_history() {
        let mut store = JobStore::new();
        for url in ["https://a", "https://b", "https://c", "https://d"] {
            store.add_in_flight(record(url)).unwrap();
        }
        let mut done = store.find_in_flight("https://a").unwrap().clone();
        done.complete(None, None);
        store.move_to_history(done);
        let mut failed = store.find_in_flight("https://b").unwrap().clone();
        failed.fail("x");
        store.move_to_history(failed);
        store.cancel_by_url("https://c");

        let stats = store.stats();
        assert_eq!(stats.total, store.in_flight().len() + store.history().len());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.active, 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.stats, stats);
        assert_eq!(snapshot.history.len(), 3);
        assert_eq!(snapshot.in_flight[0].url, "https://d");
    }
}
