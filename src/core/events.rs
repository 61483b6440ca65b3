//! Observer delivery across the thread boundary
//!
//! Background jobs never call observer code directly. They push [`JobEvent`]s
//! into an unbounded channel; the presentation layer owns the [`Inbox`] and
//! drains it on its own thread, which is where the per-job callbacks run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::models::{JobId, JobRecord};

/// State change of one job, as seen by observers
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum JobEvent {
    Progress(JobRecord),
    Completed(JobRecord),
    Failed { record: JobRecord, message: String },
    Cancelled(JobRecord),
}

impl JobEvent {
    pub fn record(&self) -> &JobRecord {
        match self {
            JobEvent::Progress(record)
            | JobEvent::Completed(record)
            | JobEvent::Cancelled(record)
            | JobEvent::Failed { record, .. } => record,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.record().id
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// What travels over the channel: callback registrations and job events, in
/// the order the manager produced them.
pub(crate) enum Delivery {
    Register {
        job_id: JobId,
        callbacks: JobCallbacks,
    },
    Event(JobEvent),
}

pub(crate) type DeliverySender = mpsc::UnboundedSender<Delivery>;
pub(crate) type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

pub(crate) fn channel() -> (DeliverySender, Inbox) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (sender, Inbox::new(receiver))
}

type ProgressFn = Box<dyn FnMut(&JobRecord) + Send>;
type CompleteFn = Box<dyn FnOnce(&JobRecord) + Send>;
type ErrorFn = Box<dyn FnOnce(&JobRecord, &str) + Send>;

/// The three observer slots of one submitted job.
///
/// `on_progress` may run any number of times, then exactly one of `on_complete`
/// or `on_error` runs. A cancelled job gets neither.
#[derive(Default)]
pub struct JobCallbacks {
    on_progress: Option<ProgressFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl JobCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(&JobRecord) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce(&JobRecord) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&JobRecord, &str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for JobCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Consumer end of the delivery channel, owned by the presentation layer
pub struct Inbox {
    receiver: DeliveryReceiver,
    callbacks: HashMap<JobId, JobCallbacks>,
}

impl Inbox {
    fn new(receiver: DeliveryReceiver) -> Self {
        Self {
            receiver,
            callbacks: HashMap::new(),
        }
    }

    /// Wait for the next job event, run its callback and return it.
    ///
    /// Returns `None` once the manager and every job worker are gone.
    pub async fn dispatch_next(&mut self) -> Option<JobEvent> {
        loop {
            let delivery = self.receiver.recv().await?;
            if let Some(event) = self.handle(delivery) {
                return Some(event);
            }
        }
    }

    /// Blocking variant of [`Inbox::dispatch_next`] for a dedicated UI thread.
    /// Must not be called from inside an async context.
    pub fn blocking_dispatch_next(&mut self) -> Option<JobEvent> {
        loop {
            let delivery = self.receiver.blocking_recv()?;
            if let Some(event) = self.handle(delivery) {
                return Some(event);
            }
        }
    }

    /// Drain everything that is queued right now without waiting; suited to
    /// frame-driven UIs that poll once per frame.
    pub fn try_dispatch(&mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Ok(delivery) = self.receiver.try_recv() {
            if let Some(event) = self.handle(delivery) {
                events.push(event);
            }
        }
        events
    }

    /// Dispatch until the channel closes
    pub async fn run(mut self) {
        while self.dispatch_next().await.is_some() {}
        debug!("Inbox closed");
    }

    /// Jobs that still have callbacks registered
    pub fn pending_jobs(&self) -> usize {
        self.callbacks.len()
    }

    fn handle(&mut self, delivery: Delivery) -> Option<JobEvent> {
        match delivery {
            Delivery::Register { job_id, callbacks } => {
                self.callbacks.insert(job_id, callbacks);
                None
            }
            Delivery::Event(event) => {
                self.invoke(&event);
                Some(event)
            }
        }
    }

    fn invoke(&mut self, event: &JobEvent) {
        let job_id = event.job_id();
        match event {
            JobEvent::Progress(record) => {
                if let Some(f) = self
                    .callbacks
                    .get_mut(&job_id)
                    .and_then(|cb| cb.on_progress.as_mut())
                {
                    isolate(job_id, "on_progress", || f(record));
                }
            }
            JobEvent::Completed(record) => {
                if let Some(f) = self.callbacks.remove(&job_id).and_then(|cb| cb.on_complete) {
                    isolate(job_id, "on_complete", || f(record));
                }
            }
            JobEvent::Failed { record, message } => {
                if let Some(f) = self.callbacks.remove(&job_id).and_then(|cb| cb.on_error) {
                    isolate(job_id, "on_error", || f(record, message));
                }
            }
            JobEvent::Cancelled(_) => {
                self.callbacks.remove(&job_id);
            }
        }
    }
}

// A failing observer must not take the dispatch loop down with it
fn isolate(job_id: JobId, slot: &str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            "Observer {} for job {} panicked: {}",
            slot,
            job_id,
            panic_message(panic.as_ref())
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
