//! Accumulation of bulkable works into composite requests.
//!
//! The [`Bulker`] owns at most one live accumulation. Its life has two
//! independent milestones:
//!
//! - **registration** ([`Bulker::flush_if_needed`]): the works accumulated so
//!   far become a step of the current sequence. The step waits for the
//!   composite execution. An accumulation may be registered in several
//!   consecutive sequences when worksets only contain bulkable works.
//! - **release** ([`Bulker::finalize`]): the accumulation is closed, its items
//!   are handed to the composite execution, and the next bulkable work starts
//!   a fresh accumulation.
//!
//! The composite request is sent exactly once, by whichever sequence first
//! reaches a step that waits for it, and only after release.

use crate::{
    BulkableWork, Error, ExecutionContext, Result, SequenceBuilder, Settled, Transport,
    future::Completer,
};
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::oneshot;

/// Routes one item outcome of a composite response to its work.
type ItemHandler<T> = Box<dyn FnOnce(Result<<T as Transport>::BulkItemResponse>) + Send>;

/// Accumulates bulkable works and turns them into composite executions.
pub struct Bulker<T: Transport> {
    current: Option<Accumulation<T>>,
}

impl<T: Transport> Bulker<T> {
    /// Creates a bulker with no pending accumulation.
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Appends a work to the current accumulation, starting one if needed.
    ///
    /// Nothing is sent. `completer` is resolved once the composite request
    /// carrying this work has executed.
    pub(crate) fn add<O>(
        &mut self,
        work: Box<dyn BulkableWork<T, Output = O>>,
        completer: Completer<O>,
    ) where
        O: Send + 'static,
    {
        let item = work.bulk_item();
        let handler: ItemHandler<T> = Box::new(move |outcome| {
            let result = outcome.and_then(|response| work.handle_bulk_item(response));
            // The caller may have dropped its future; nothing to report then.
            let _ = completer.send(result);
        });

        self.current
            .get_or_insert_with(Accumulation::new)
            .push(item, handler);
    }

    /// Registers the works accumulated since the last registration as a step
    /// of `sequence`.
    ///
    /// Returns `true` if a step was added, `false` if there was nothing new to
    /// register. Registration does not release the accumulation: more works may
    /// still join it until [`finalize`](Self::finalize).
    pub fn flush_if_needed(&mut self, sequence: &mut SequenceBuilder<T>) -> bool {
        let Some(bulk) = self.current.as_mut() else {
            return false;
        };

        let unregistered = bulk.len() - bulk.registered;
        if unregistered == 0 {
            return false;
        }

        let execution = bulk.execution(sequence.context());
        // Completion is observed through each work's own future.
        let _ = sequence.add_bulk_execution(execution, unregistered);
        bulk.registered = bulk.len();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            works = unregistered,
            total = bulk.len(),
            "Registered bulk works in sequence"
        );

        true
    }

    /// Closes the current accumulation and releases it for execution.
    ///
    /// Leaves no pending accumulation behind. Works that were never registered
    /// in a sequence cannot be executed and fail with [`Error::Abandoned`].
    pub fn finalize(&mut self) {
        if let Some(bulk) = self.current.take() {
            bulk.release();
        }
    }

    /// Number of works in the current accumulation.
    pub fn pending_len(&self) -> usize {
        self.current.as_ref().map_or(0, Accumulation::len)
    }

    /// Returns `true` if no accumulation is pending.
    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }
}

impl<T: Transport> Default for Bulker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> core::fmt::Debug for Bulker<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bulker")
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// Works gathered for one composite request.
struct Accumulation<T: Transport> {
    items: Vec<T::BulkItem>,
    handlers: Vec<ItemHandler<T>>,
    /// Number of leading works already covered by a sequence step.
    registered: usize,
    /// Created by the first registration; shared by every later one.
    execution: Option<(Settled, oneshot::Sender<ClosedBulk<T>>)>,
}

impl<T: Transport> Accumulation<T> {
    const fn new() -> Self {
        Self {
            items: Vec::new(),
            handlers: Vec::new(),
            registered: 0,
            execution: None,
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn push(&mut self, item: T::BulkItem, handler: ItemHandler<T>) {
        self.items.push(item);
        self.handlers.push(handler);
    }

    /// Returns the shared composite execution, creating it on first use.
    ///
    /// The execution waits for the closed bulk before sending anything.
    fn execution(&mut self, context: &ExecutionContext<T>) -> Settled {
        let (settled, _) = self.execution.get_or_insert_with(|| {
            let (tx, rx) = oneshot::channel::<ClosedBulk<T>>();
            let context = context.clone();
            let settled = Settled::new(async move {
                // A dropped sender means the accumulation was abandoned; its
                // handlers have already been dropped with it.
                if let Ok(bulk) = rx.await {
                    bulk.execute(context).await;
                }
            });
            (settled, tx)
        });
        settled.clone()
    }

    fn release(self) {
        let Self {
            items,
            handlers,
            execution,
            ..
        } = self;

        if items.is_empty() {
            return;
        }

        let bulk = ClosedBulk { items, handlers };

        #[cfg(feature = "tracing")]
        tracing::debug!(works = bulk.items.len(), "Releasing bulk for execution");

        match execution {
            Some((_, tx)) => {
                if let Err(bulk) = tx.send(bulk) {
                    bulk.abandon();
                }
            }
            None => bulk.abandon(),
        }
    }
}

/// A released accumulation, ready to be sent as one composite request.
struct ClosedBulk<T: Transport> {
    items: Vec<T::BulkItem>,
    handlers: Vec<ItemHandler<T>>,
}

impl<T: Transport> ClosedBulk<T> {
    /// Sends the composite request and routes each outcome to its work.
    ///
    /// A request-level failure fails every work with the same error. An
    /// item-level failure only fails the work it is aligned with.
    async fn execute(self, context: ExecutionContext<T>) {
        let Self { items, handlers } = self;
        let expected = items.len();

        match context.transport().execute_bulk(items).await {
            Ok(outcomes) if outcomes.len() == expected => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    works = expected,
                    failed = outcomes.iter().filter(|o| o.is_err()).count(),
                    "Bulk executed"
                );

                for (handler, outcome) in handlers.into_iter().zip(outcomes) {
                    Self::settle(handler, outcome);
                }
            }
            Ok(outcomes) => {
                let err = Error::MalformedBulkResponse {
                    expected,
                    actual: outcomes.len(),
                };

                #[cfg(feature = "tracing")]
                tracing::debug!(works = expected, "Bulk response misaligned: {err}");

                Self::fail_all(handlers, &err);
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(works = expected, "Bulk request failed: {err}");

                Self::fail_all(handlers, &err);
            }
        }
    }

    fn abandon(self) {
        Self::fail_all(self.handlers, &Error::Abandoned);
    }

    fn fail_all(handlers: Vec<ItemHandler<T>>, err: &Error) {
        for handler in handlers {
            Self::settle(handler, Err(err.clone()));
        }
    }

    /// Runs one work's handler. A panicking handler drops its own completer,
    /// which resolves that work to [`Error::Abandoned`], and leaves the other
    /// works of the bulk untouched.
    fn settle(handler: ItemHandler<T>, outcome: Result<T::BulkItemResponse>) {
        if panic::catch_unwind(AssertUnwindSafe(|| handler(outcome))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Bulk item handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{Call, RecordingTransport, bulk_work, context};
    use crate::future::work_channel;

    #[tokio::test]
    async fn registration_is_incremental() {
        let transport = RecordingTransport::new();
        let mut bulker = Bulker::new();
        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());

        assert!(!bulker.flush_if_needed(&mut sequence));

        let (c1, f1) = work_channel();
        bulker.add(bulk_work(1), c1);
        assert!(bulker.flush_if_needed(&mut sequence));
        // Nothing new since the last registration.
        assert!(!bulker.flush_if_needed(&mut sequence));

        let (c2, f2) = work_channel();
        bulker.add(bulk_work(2), c2);
        assert!(bulker.flush_if_needed(&mut sequence));
        assert_eq!(bulker.pending_len(), 2);

        bulker.finalize();
        assert!(bulker.is_empty());
        sequence.build().await;

        assert_eq!(f1.await, Ok(1));
        assert_eq!(f2.await, Ok(2));
        assert_eq!(transport.calls(), vec![Call::Bulk(vec![1, 2])]);
    }

    #[tokio::test]
    async fn finalize_without_registration_abandons_works() {
        let mut bulker: Bulker<RecordingTransport> = Bulker::new();
        let (c1, f1) = work_channel();
        bulker.add(bulk_work(1), c1);

        bulker.finalize();

        assert!(bulker.is_empty());
        assert_eq!(f1.await, Err(Error::Abandoned));
    }

    #[tokio::test]
    async fn finalize_on_empty_bulker_is_a_no_op() {
        let transport = RecordingTransport::new();
        let mut bulker = Bulker::new();
        bulker.finalize();
        assert!(bulker.is_empty());

        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());
        assert!(!bulker.flush_if_needed(&mut sequence));
        sequence.build().await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn misaligned_response_fails_every_work() {
        let transport = RecordingTransport::new();
        transport.drop_last_bulk_item();
        let mut bulker = Bulker::new();
        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());

        let (c1, f1) = work_channel();
        let (c2, f2) = work_channel();
        bulker.add(bulk_work(1), c1);
        bulker.add(bulk_work(2), c2);
        bulker.flush_if_needed(&mut sequence);
        bulker.finalize();
        sequence.build().await;

        let expected = Err(Error::MalformedBulkResponse {
            expected: 2,
            actual: 1,
        });
        assert_eq!(f1.await, expected);
        assert_eq!(f2.await, expected);
    }
}
