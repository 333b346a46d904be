//! Asynchronous units of work and the queue that carries them.
//!
//! Every exposed operation that touches the network or the PDF runs as a
//! [`Job`]. Submitters get a [`JobHandle`] back and never observe the
//! result; outcomes are visible through persisted state or, for failures,
//! through the queue's failure records.
//!
//! [`LocalJobQueue`] is the in-process implementation used by the CLI and the
//! tests. A deployment with a real task broker implements [`JobQueue`] over
//! it instead.

use crate::error::TriageError;
use crate::model::{DocumentId, PageId};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error};

/// A named unit of work addressed by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Job {
    Ingest(DocumentId),
    DispatchOcr(DocumentId),
    OcrPage(PageId),
    Classify(DocumentId),
    ExtractMaterials(DocumentId),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Ingest(id) => write!(f, "ingest(document {id})"),
            Job::DispatchOcr(id) => write!(f, "dispatch-ocr(document {id})"),
            Job::OcrPage(id) => write!(f, "ocr(page {id})"),
            Job::Classify(id) => write!(f, "classify(document {id})"),
            Job::ExtractMaterials(id) => write!(f, "extract-materials(document {id})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: u64,
}

/// Fire-and-forget job submission.
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: Job) -> JobHandle;
}

/// A job that returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub handle: JobHandle,
    pub job: Job,
    pub error: String,
}

#[derive(Debug)]
struct QueuedJob {
    handle: JobHandle,
    job: Job,
}

/// Receiving end of a [`LocalJobQueue`], consumed by [`run_worker`].
#[derive(Debug)]
pub struct JobReceiver(mpsc::UnboundedReceiver<QueuedJob>);

/// In-process [`JobQueue`] over an unbounded channel.
pub struct LocalJobQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    next_id: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
    failures: Mutex<Vec<JobFailure>>,
}

impl LocalJobQueue {
    pub fn new() -> (Arc<Self>, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            sender,
            next_id: AtomicU64::new(1),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            failures: Mutex::new(Vec::new()),
        });
        (queue, JobReceiver(receiver))
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolve once no job is pending, including jobs submitted by jobs.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Failures recorded so far, oldest first.
    pub fn failures(&self) -> Vec<JobFailure> {
        self.failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn record_failure(&self, failure: JobFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }

    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl JobQueue for LocalJobQueue {
    fn submit(&self, job: Job) -> JobHandle {
        let handle = JobHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(job = %job, id = handle.id, "Job submitted");

        if self.sender.send(QueuedJob { handle, job }).is_err() {
            error!(job = %job, "Job queue closed, dropping job");
            self.record_failure(JobFailure {
                handle,
                job,
                error: "job queue closed".into(),
            });
            self.finish();
        }
        handle
    }
}

/// Drain `receiver`, running up to `concurrency` jobs at once through
/// `handler`. Returns when every sender is gone.
pub async fn run_worker<F, Fut>(
    queue: Arc<LocalJobQueue>,
    receiver: JobReceiver,
    concurrency: usize,
    handler: F,
) where
    F: Fn(Job) -> Fut,
    Fut: Future<Output = Result<(), TriageError>>,
{
    UnboundedReceiverStream::new(receiver.0)
        .for_each_concurrent(concurrency.max(1), |queued| {
            let queue = Arc::clone(&queue);
            let fut = handler(queued.job);
            async move {
                match fut.await {
                    Ok(()) => debug!(job = %queued.job, "Job finished"),
                    Err(e) => {
                        error!(job = %queued.job, "Job failed: {}", e);
                        queue.record_failure(JobFailure {
                            handle: queued.handle,
                            job: queued.job,
                            error: e.to_string(),
                        });
                    }
                }
                queue.finish();
            }
        })
        .await;
}
