//! Download Manager - orchestrates yt-dlp jobs
//!
//! The manager owns the job store, spawns one background unit per submitted URL
//! and funnels every state change into the delivery channel. Observers never run
//! on the background units; they run wherever the [`Inbox`] is drained.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::config::ManagerSettings;
use crate::core::engine::Engine;
use crate::core::events::{self, Delivery, DeliverySender, Inbox, JobCallbacks, JobEvent};
use crate::core::models::{AppError, AppResult, DownloadStats, JobId, JobRecord, JobStatus};
use crate::core::options::{EngineConfig, Options};
use crate::core::progress_adapter::{ProgressAdapter, ProgressPublisher};
use crate::core::store::{JobStore, JobsSnapshot};
use crate::utils::validation::validate_job_url;

/// State shared between the manager and its background units.
///
/// Every event is sent while the store lock is held, so the channel order is
/// the bookkeeping order.
pub(crate) struct Shared {
    store: Mutex<JobStore>,
    events: DeliverySender,
}

impl Shared {
    fn new(events: DeliverySender) -> Self {
        Self {
            store: Mutex::new(JobStore::new()),
            events,
        }
    }

    fn send(&self, delivery: Delivery) {
        if self.events.send(delivery).is_err() {
            debug!("Inbox dropped, event discarded");
        }
    }

    fn register(&self, record: JobRecord, callbacks: JobCallbacks) -> AppResult<()> {
        let mut store = self.store.lock();
        let job_id = record.id;
        store.add_in_flight(record)?;
        self.send(Delivery::Register { job_id, callbacks });
        Ok(())
    }

    fn is_in_flight(&self, id: JobId) -> bool {
        self.store.lock().is_in_flight(id)
    }

    /// Record the terminal transition and emit the matching event, unless the
    /// job already left the in-flight set.
    fn finish(&self, record: JobRecord) {
        let mut store = self.store.lock();
        let event = match record.status {
            JobStatus::Completed => JobEvent::Completed(record.clone()),
            JobStatus::Error => JobEvent::Failed {
                message: record.error_message.clone().unwrap_or_default(),
                record: record.clone(),
            },
            status => {
                error!("Job {} finished with non-terminal status {}", record.id, status);
                return;
            }
        };

        if store.move_to_history(record) {
            self.send(Delivery::Event(event));
        } else {
            debug!(
                "Job {} was cancelled before it finished, dropping {} result",
                event.job_id(),
                event.record().status
            );
        }
    }

    fn cancel(&self, url: &str) -> Option<JobRecord> {
        let mut store = self.store.lock();
        let record = store.cancel_by_url(url)?;
        self.send(Delivery::Event(JobEvent::Cancelled(record.clone())));
        Some(record)
    }
}

impl ProgressPublisher for Shared {
    fn publish(&self, record: &JobRecord) -> bool {
        let mut store = self.store.lock();
        if !store.update_in_flight(record) {
            return false;
        }
        self.send(Delivery::Event(JobEvent::Progress(record.clone())));
        true
    }
}

/// Main download manager
pub struct DownloadManager {
    shared: Arc<Shared>,
    engine: Arc<dyn Engine>,
    options: RwLock<Options>,
    runtime: Handle,
    limiter: Option<Arc<Semaphore>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create a manager bound to the current tokio runtime.
    ///
    /// Returns the manager together with the [`Inbox`] the presentation layer
    /// must drain for callbacks to run.
    pub fn new(
        engine: Arc<dyn Engine>,
        options: Options,
        settings: ManagerSettings,
    ) -> AppResult<(Self, Inbox)> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::System(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::with_runtime(engine, options, settings, runtime))
    }

    pub fn with_runtime(
        engine: Arc<dyn Engine>,
        options: Options,
        settings: ManagerSettings,
        runtime: Handle,
    ) -> (Self, Inbox) {
        let (sender, inbox) = events::channel();
        let limiter = settings
            .max_concurrent_jobs
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        info!(
            "🚀 Download manager ready (engine: {}, concurrency: {})",
            engine.name(),
            settings
                .max_concurrent_jobs
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );

        let manager = Self {
            shared: Arc::new(Shared::new(sender)),
            engine,
            options: RwLock::new(options),
            runtime,
            limiter,
            workers: Mutex::new(Vec::new()),
        };
        (manager, inbox)
    }

    /// Start downloading `url` with the current options. Returns as soon as the
    /// job is registered; all further reporting goes through `callbacks`.
    pub fn submit(&self, url: &str, callbacks: JobCallbacks) -> AppResult<JobId> {
        let url = validate_job_url(url)?;
        let options = self.options.read().clone();
        let record = JobRecord::new(url, options.output_path.clone());
        let job_id = record.id;

        self.shared.register(record.clone(), callbacks)?;
        info!("📥 Queued download: {} ({})", url, job_id);

        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        let limiter = self.limiter.clone();
        let config = options.to_engine_config();

        let handle = self.runtime.spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!("Concurrency limiter closed, job {} not started", job_id);
                        return;
                    }
                },
                None => None,
            };

            if !shared.is_in_flight(job_id) {
                debug!("Job {} cancelled while queued, skipping engine", job_id);
                return;
            }

            let result =
                tokio::task::spawn_blocking(move || run_job(&shared, engine.as_ref(), record, &config))
                    .await;
            if let Err(e) = result {
                error!("❌ Background unit for job {} aborted: {}", job_id, e);
            }
        });

        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.is_finished());
        workers.push(handle);

        Ok(job_id)
    }

    /// Cancel the in-flight job for `url`. Bookkeeping only: the engine keeps
    /// running and its eventual result is discarded.
    pub fn cancel(&self, url: &str) -> bool {
        match self.shared.cancel(url) {
            Some(record) => {
                info!("🚫 Cancelled download: {} ({})", url, record.id);
                true
            }
            None => {
                debug!("Nothing cancellable in flight for {}", url);
                false
            }
        }
    }

    pub fn stats_snapshot(&self) -> DownloadStats {
        self.shared.store.lock().stats()
    }

    pub fn in_flight(&self) -> Vec<JobRecord> {
        self.shared.store.lock().in_flight().to_vec()
    }

    pub fn history(&self) -> Vec<JobRecord> {
        self.shared.store.lock().history().to_vec()
    }

    pub fn snapshot(&self) -> JobsSnapshot {
        self.shared.store.lock().snapshot()
    }

    /// Copy of the options the next submission will use
    pub fn options(&self) -> Options {
        self.options.read().clone()
    }

    /// Replace the options. Jobs already submitted keep their snapshot.
    pub fn set_options(&self, options: Options) {
        *self.options.write() = options;
        info!("Updated download options");
    }

    pub fn update_options(&self, f: impl FnOnce(&mut Options)) {
        f(&mut *self.options.write());
    }

    /// Wait until every background unit spawned so far has returned,
    /// including units submitted while waiting.
    pub async fn shutdown(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!("Background unit ended abnormally: {}", e);
                }
            }
        }
        info!("✅ All background units finished");
    }
}

/// Body of one background unit; runs on the blocking pool
fn run_job(shared: &Shared, engine: &dyn Engine, record: JobRecord, config: &EngineConfig) {
    let url = record.url.clone();
    let job_id = record.id;
    debug!("Starting {} for {} ({})", engine.name(), url, job_id);

    let mut adapter = ProgressAdapter::new(record, shared);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        engine.extract_and_download(&url, config, &mut adapter)
    }));
    let mut record = adapter.into_record();

    match outcome {
        Ok(Ok(metadata)) => {
            record.complete(metadata.title, metadata.duration_seconds);
            info!("✅ Download completed: {} -> {}", url, record.title);
        }
        Ok(Err(failure)) => {
            error!("❌ Download failed: {} - {}", url, failure);
            record.fail(failure.message);
        }
        Err(panic) => {
            let message = format!("engine panicked: {}", events::panic_message(panic.as_ref()));
            error!("❌ Download failed: {} - {}", url, message);
            record.fail(message);
        }
    }

    shared.finish(record);
}
