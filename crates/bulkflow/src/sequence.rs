//! Ordered chains of execution steps.
//!
//! A [`SequenceBuilder`] collects the steps decided during one workset and
//! turns them into a single background task. Steps run strictly in the order
//! they were appended: step *k + 1* starts once step *k* has settled,
//! successfully or not. The sequence itself starts once the previous sequence
//! of the same processor has settled.
//!
//! ```text
//! previous ──▶ [bulk #1] ──▶ [standalone W3] ──▶ [bulk #2] ──▶ settled
//! ```

use crate::{
    ExecutionContext, NonBulkableWork, Settled, Transport, WorkFuture,
    future::{Completer, work_channel},
};
use futures::{FutureExt, future::BoxFuture};
use std::panic::AssertUnwindSafe;

/// Kind of a step appended to a sequence, in append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Waits for a composite execution carrying `works` works of this
    /// sequence.
    Bulk { works: usize },
    /// Executes one non-bulkable work.
    NonBulk,
}

enum Step<T: Transport> {
    Bulk(Settled),
    NonBulk(Box<dyn FnOnce(ExecutionContext<T>) -> BoxFuture<'static, ()> + Send>),
}

/// Builds the chain of steps for one workset.
///
/// The builder is consumed by [`build`](Self::build), so a sequence can be
/// built only once and no step can be appended afterwards.
pub struct SequenceBuilder<T: Transport> {
    context: ExecutionContext<T>,
    previous: Settled,
    steps: Vec<Step<T>>,
    kinds: Vec<StepKind>,
}

impl<T: Transport> SequenceBuilder<T> {
    /// Starts a new, empty sequence bound to `context`.
    ///
    /// The built sequence waits for `previous` before running its first step.
    pub const fn new(context: ExecutionContext<T>, previous: Settled) -> Self {
        Self {
            context,
            previous,
            steps: Vec::new(),
            kinds: Vec::new(),
        }
    }

    /// The context every step of this sequence runs with.
    pub const fn context(&self) -> &ExecutionContext<T> {
        &self.context
    }

    /// Appends a standalone step executing `work`.
    ///
    /// Returns the future of that work alone, distinct from the sequence's
    /// completion.
    pub fn add_non_bulk_execution<O>(
        &mut self,
        work: Box<dyn NonBulkableWork<T, Output = O>>,
    ) -> WorkFuture<O>
    where
        O: Send + 'static,
    {
        let (completer, future) = work_channel();
        self.add_non_bulk_execution_with(work, completer);
        future
    }

    pub(crate) fn add_non_bulk_execution_with<O>(
        &mut self,
        work: Box<dyn NonBulkableWork<T, Output = O>>,
        completer: Completer<O>,
    ) where
        O: Send + 'static,
    {
        self.steps.push(Step::NonBulk(Box::new(move |context| {
            async move {
                let result = work.execute(context).await;
                let _ = completer.send(result);
            }
            .boxed()
        })));
        self.kinds.push(StepKind::NonBulk);
    }

    /// Appends a step that waits for a composite execution.
    ///
    /// `works` is the number of this sequence's works carried by the
    /// execution. The returned signal settles with the execution, after every
    /// work it carries has been resolved.
    pub fn add_bulk_execution(&mut self, execution: Settled, works: usize) -> Settled {
        self.steps.push(Step::Bulk(execution.clone()));
        self.kinds.push(StepKind::Bulk { works });
        execution
    }

    /// Steps appended so far, in execution order.
    pub fn steps(&self) -> &[StepKind] {
        &self.kinds
    }

    /// Returns `true` if no step was appended.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Finalizes the chain and spawns it on the current Tokio runtime.
    ///
    /// The returned signal settles once every step has settled. It never
    /// reports failures: a failing or panicking step does not prevent the
    /// following steps from running.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> Settled {
        let Self {
            context,
            previous,
            steps,
            kinds,
        } = self;

        #[cfg(feature = "tracing")]
        tracing::trace!(steps = ?kinds, "Building sequence");
        #[cfg(not(feature = "tracing"))]
        let _ = kinds;

        let chain = async move {
            previous.await;
            for step in steps {
                let context = context.clone();
                let run = async move {
                    match step {
                        Step::Bulk(execution) => execution.await,
                        Step::NonBulk(execute) => execute(context).await,
                    }
                };
                if AssertUnwindSafe(run).catch_unwind().await.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Sequence step panicked; continuing with the next step");
                }
            }
        };

        let handle = tokio::spawn(chain);
        Settled::new(handle.map(|_| ()))
    }
}

impl<T: Transport> core::fmt::Debug for SequenceBuilder<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SequenceBuilder")
            .field("steps", &self.kinds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::tests::{Call, RecordingTransport, context, gated_work, single_work};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn runs_steps_in_append_order() {
        let transport = RecordingTransport::new();
        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());

        let f1 = sequence.add_non_bulk_execution(single_work(1));
        let f2 = sequence.add_non_bulk_execution(single_work(2));
        assert_eq!(sequence.steps(), &[StepKind::NonBulk, StepKind::NonBulk]);

        sequence.build().await;

        assert_eq!(f1.await, Ok(1));
        assert_eq!(f2.await, Ok(2));
        assert_eq!(transport.calls(), vec![Call::Single(1), Call::Single(2)]);
    }

    #[tokio::test]
    async fn next_step_waits_for_previous_one() {
        let transport = RecordingTransport::new();
        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());

        let (gate, gated) = gated_work();
        let f1 = sequence.add_non_bulk_execution(gated);
        let f2 = sequence.add_non_bulk_execution(single_work(2));
        let settled = sequence.build();

        tokio::task::yield_now().await;
        assert!(settled.clone().now_or_never().is_none());
        assert!(transport.calls().is_empty());

        gate.send(Ok(1)).unwrap();
        settled.await;

        assert_eq!(f1.await, Ok(1));
        assert_eq!(f2.await, Ok(2));
        assert_eq!(transport.calls(), vec![Call::Single(2)]);
    }

    #[tokio::test]
    async fn waits_for_previous_sequence() {
        let transport = RecordingTransport::new();
        let (tx, rx) = oneshot::channel::<()>();
        let previous = Settled::new(async move {
            let _ = rx.await;
        });

        let mut sequence = SequenceBuilder::new(context(&transport), previous);
        let f1 = sequence.add_non_bulk_execution(single_work(1));
        let settled = sequence.build();

        tokio::task::yield_now().await;
        assert!(transport.calls().is_empty());

        tx.send(()).unwrap();
        settled.await;
        assert_eq!(f1.await, Ok(1));
    }

    #[tokio::test]
    async fn failures_settle_without_stopping_the_chain() {
        let transport = RecordingTransport::new();
        transport.fail_single(1);
        let mut sequence = SequenceBuilder::new(context(&transport), Settled::ready());

        let f1 = sequence.add_non_bulk_execution(single_work(1));
        let f2 = sequence.add_non_bulk_execution(single_work(2));
        sequence.build().await;

        assert!(matches!(f1.await, Err(Error::Request { .. })));
        assert_eq!(f2.await, Ok(2));
    }

    #[tokio::test]
    async fn empty_sequence_settles() {
        let transport = RecordingTransport::new();
        let sequence = SequenceBuilder::new(context(&transport), Settled::ready());
        assert!(sequence.is_empty());
        sequence.build().await;
    }
}
