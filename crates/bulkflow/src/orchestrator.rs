//! Shared, queue-fed front end for a [`SerialWorkProcessor`].
//!
//! A processor must be driven from a single logical thread of control. The
//! [`BatchingOrchestrator`] makes it usable from many concurrent callers:
//! callers enqueue complete [`Workset`]s, and one background worker drains the
//! queue in batches.
//!
//! ```text
//! caller ─┐                  ┌─ begin_workset / submit* / end ─┐
//! caller ─┼─▶ bounded queue ─┤  (up to N worksets)            ├─▶ end_batch ─▶ wait
//! caller ─┘                  └────────────────────────────────┘
//! ```
//!
//! Batches do not overlap: the worker waits for one batch to settle before
//! draining the next one, so bulkable works from every workset in a batch can
//! share composite requests.

use crate::{
    Error, ExecutionContext, OrchestratorConfig, Result, SerialWorkProcessor, Settled, Transport,
    Work, WorkFuture, WorksetGuard,
    future::{Completer, work_channel},
};
use core::num::NonZeroUsize;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// An ordered group of works, prepared before submission.
///
/// Each work's future is handed out by [`add`](Self::add), before the workset
/// is queued.
pub struct Workset<T: Transport> {
    works: Vec<Box<dyn QueuedWork<T>>>,
}

impl<T: Transport> Workset<T> {
    /// Creates an empty workset.
    pub const fn new() -> Self {
        Self { works: Vec::new() }
    }

    /// Creates an empty workset with room for `capacity` works.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            works: Vec::with_capacity(capacity),
        }
    }

    /// Appends a work and returns the future of its result.
    pub fn add<O>(&mut self, work: Work<T, O>) -> WorkFuture<O>
    where
        O: Send + 'static,
    {
        let (completer, future) = work_channel();
        self.works.push(Box::new(Queued { work, completer }));
        future
    }

    /// Number of works in the workset.
    pub fn len(&self) -> usize {
        self.works.len()
    }

    /// Returns `true` if the workset holds no work.
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    fn submit_to(self, guard: &mut WorksetGuard<'_, T>) {
        for work in self.works {
            work.submit_to(guard);
        }
    }
}

impl<T: Transport> Default for Workset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> core::fmt::Debug for Workset<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Workset")
            .field("works", &self.works.len())
            .finish()
    }
}

/// A work waiting in the queue, with its output type erased.
trait QueuedWork<T: Transport>: Send {
    fn submit_to(self: Box<Self>, guard: &mut WorksetGuard<'_, T>);
}

struct Queued<T: Transport, O> {
    work: Work<T, O>,
    completer: Completer<O>,
}

impl<T: Transport, O: Send + 'static> QueuedWork<T> for Queued<T, O> {
    fn submit_to(self: Box<Self>, guard: &mut WorksetGuard<'_, T>) {
        guard.submit_with(self.work, self.completer);
    }
}

/// Messages consumed by the orchestrator worker.
enum OrchestratorRequest<T: Transport> {
    /// Run a workset in the next batch and report its completion.
    Workset {
        workset: Workset<T>,
        response: oneshot::Sender<Settled>,
    },
    /// Finish the current batch, acknowledge, and stop.
    Shutdown { response: oneshot::Sender<()> },
}

/// Serializes worksets from many callers onto one processor.
pub struct BatchingOrchestrator<T: Transport> {
    queue: mpsc::Sender<OrchestratorRequest<T>>,
    shutdown_token: CancellationToken,
    shutdown_timeout: core::time::Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> BatchingOrchestrator<T> {
    /// Creates the orchestrator and spawns its worker on the current Tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(context: ExecutionContext<T>, config: OrchestratorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.get());
        let processor = SerialWorkProcessor::new(context, config.processor);
        let worker = tokio::spawn(worker_loop(rx, processor, config.max_worksets_per_batch));

        #[cfg(feature = "tracing")]
        tracing::debug!(?config, "Orchestrator started");

        Self {
            queue: tx,
            shutdown_token: CancellationToken::new(),
            shutdown_timeout: config.shutdown_timeout,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a workset for the next batch.
    ///
    /// Resolves once the workset has been turned into a sequence, with the
    /// signal that settles when that sequence has executed. Waits while the
    /// queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The orchestrator is shutting down.
    /// - The worker stopped before picking up the workset.
    pub async fn submit(&self, workset: Workset<T>) -> Result<Settled> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let (tx, rx) = oneshot::channel();
        self.queue
            .send(OrchestratorRequest::Workset {
                workset,
                response: tx,
            })
            .await
            .map_err(|_| Error::ChannelError {
                context: "Orchestrator queue closed".to_string(),
            })?;

        rx.await.map_err(|_| Error::ChannelError {
            context: "Orchestrator worker dropped the workset".to_string(),
        })
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Gracefully stops the orchestrator.
    ///
    /// - Refuses new worksets.
    /// - Lets the worker run every workset queued so far and settle its batch.
    /// - Waits up to the configured timeout for the acknowledgement.
    ///
    /// Concurrent and later calls wait for the first call to finish, then
    /// return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is already gone, or does not acknowledge
    /// in time.
    pub async fn shutdown(&self) -> Result<()> {
        // Held until the worker has stopped.
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new worksets");
        self.shutdown_token.cancel();

        let (tx, rx) = oneshot::channel();
        self.queue
            .send(OrchestratorRequest::Shutdown { response: tx })
            .await
            .map_err(|_| Error::ChannelError {
                context: "Orchestrator queue closed".to_string(),
            })?;

        match timeout(self.shutdown_timeout, rx).await {
            Ok(Ok(())) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Orchestrator worker acknowledged shutdown");
            }
            Ok(Err(_)) => {
                return Err(Error::ChannelError {
                    context: "Orchestrator worker stopped without acknowledging".to_string(),
                });
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Orchestrator shutdown timed out");
                return Err(Error::ChannelError {
                    context: format!(
                        "Orchestrator worker did not acknowledge within {:?}",
                        self.shutdown_timeout
                    ),
                });
            }
        }

        let _ = handle.await;
        drop(worker);

        #[cfg(feature = "tracing")]
        tracing::info!("Orchestrator shutdown complete");
        Ok(())
    }
}

impl<T: Transport> core::fmt::Debug for BatchingOrchestrator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchingOrchestrator")
            .field("shutting_down", &self.is_shutting_down())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Worker task owning the processor.
///
/// Waits for a first request, then drains whatever else is already queued,
/// up to `max_worksets_per_batch` worksets. Each workset gets its own bracket;
/// the batch is ended and awaited before the next drain.
async fn worker_loop<T: Transport>(
    mut rx: mpsc::Receiver<OrchestratorRequest<T>>,
    mut processor: SerialWorkProcessor<T>,
    max_worksets_per_batch: NonZeroUsize,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Orchestrator worker started");

    let mut shutdown = None;

    while let Some(first) = rx.recv().await {
        let mut batch_len = 0;
        let mut next = Some(first);

        while let Some(request) = next.take() {
            match request {
                OrchestratorRequest::Workset { workset, response } => {
                    let mut guard = processor.begin_workset();
                    workset.submit_to(&mut guard);
                    // The submitter may have given up waiting; the works
                    // still run.
                    let _ = response.send(guard.end());
                    batch_len += 1;
                }
                OrchestratorRequest::Shutdown { response } => {
                    shutdown = Some(response);
                }
            }

            if batch_len < max_worksets_per_batch.get() {
                next = rx.try_recv().ok();
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(worksets = batch_len, "Processing batch");

        processor.end_batch().await;

        if let Some(response) = shutdown.take() {
            // Run whatever is still queued behind the shutdown request.
            rx.close();
            while let Some(request) = rx.recv().await {
                if let OrchestratorRequest::Workset { workset, response } = request {
                    let mut guard = processor.begin_workset();
                    workset.submit_to(&mut guard);
                    let _ = response.send(guard.end());
                }
            }
            processor.end_batch().await;

            if response.send(()).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Orchestrator worker failed to acknowledge shutdown");
            }
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Orchestrator worker stopped");
}
