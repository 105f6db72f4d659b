//! Single-submitter coordinator for worksets and batches.
//!
//! The [`SerialWorkProcessor`] owns the [`Bulker`] and the completion of the
//! latest sequence. Submissions go through a [`WorksetGuard`], which borrows
//! the processor mutably: at most one workset is open at a time, and works
//! cannot be submitted outside of one.
//!
//! ```text
//! begin_workset ─▶ submit* ─▶ end ─┐
//! begin_workset ─▶ submit* ─▶ end ─┤ (one batch)
//!                                  └▶ end_batch
//! ```
//!
//! Nothing here blocks on I/O. Every method returns immediately; execution
//! happens in background tasks spawned on the current Tokio runtime.

use crate::{
    Bulker, ExecutionContext, ProcessorConfig, SequenceBuilder, Settled, StepKind, Transport,
    Work, WorkFuture,
    aggregator::Aggregator,
    future::{Completer, work_channel},
};

/// Coordinates worksets submitted from a single logical thread of control.
///
/// Each processor owns its own bulker; independent processors never share an
/// accumulation.
pub struct SerialWorkProcessor<T: Transport> {
    context: ExecutionContext<T>,
    config: ProcessorConfig,
    bulker: Bulker<T>,
    latest: Settled,
}

impl<T: Transport> SerialWorkProcessor<T> {
    /// Creates a processor whose sequences run with `context`.
    pub fn new(context: ExecutionContext<T>, config: ProcessorConfig) -> Self {
        Self {
            context,
            config,
            bulker: Bulker::new(),
            latest: Settled::ready(),
        }
    }

    /// Opens a workset.
    ///
    /// The returned guard must be [ended](WorksetGuard::end) to obtain the
    /// workset's completion. Dropping it ends the workset as well.
    pub fn begin_workset(&mut self) -> WorksetGuard<'_, T> {
        let sequence = SequenceBuilder::new(self.context.clone(), self.latest.clone());
        WorksetGuard {
            processor: self,
            sequence: Some(sequence),
        }
    }

    /// Ends the current batch.
    ///
    /// Releases any bulk accumulation still pending, whether or not a
    /// workset was ever opened in this batch, and returns a signal that
    /// settles once every sequence built so far has settled.
    pub fn end_batch(&mut self) -> Settled {
        #[cfg(feature = "tracing")]
        tracing::debug!(pending = self.bulker.pending_len(), "Ending batch");

        self.bulker.finalize();
        self.latest.clone()
    }

    /// Number of bulkable works waiting for release.
    pub fn pending_bulk_len(&self) -> usize {
        self.bulker.pending_len()
    }

    /// The processor's configuration.
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

impl<T: Transport> core::fmt::Debug for SerialWorkProcessor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialWorkProcessor")
            .field("config", &self.config)
            .field("bulker", &self.bulker)
            .field("latest", &self.latest)
            .finish_non_exhaustive()
    }
}

/// An open workset.
///
/// Works submitted through the same guard are scheduled in submission order,
/// except that consecutive bulkable works may be merged into one composite
/// request.
pub struct WorksetGuard<'a, T: Transport> {
    processor: &'a mut SerialWorkProcessor<T>,
    sequence: Option<SequenceBuilder<T>>,
}

impl<T: Transport> WorksetGuard<'_, T> {
    /// Submits a work and returns the future of its result.
    ///
    /// Bulkable works are accumulated; nothing is sent yet. A non-bulkable
    /// work first pushes the pending accumulation into the sequence, then
    /// takes its own step.
    pub fn submit<O>(&mut self, work: Work<T, O>) -> WorkFuture<O>
    where
        O: Send + 'static,
    {
        let (completer, future) = work_channel();
        self.submit_with(work, completer);
        future
    }

    pub(crate) fn submit_with<O>(&mut self, work: Work<T, O>, completer: Completer<O>)
    where
        O: Send + 'static,
    {
        let Some(sequence) = self.sequence.as_mut() else {
            unreachable!("a workset guard holds its sequence until it ends");
        };
        Aggregator::new(
            &mut self.processor.bulker,
            sequence,
            self.processor.config.max_bulk_size,
        )
        .aggregate(work, completer);
    }

    /// Steps of the sequence built so far.
    pub fn steps(&self) -> &[StepKind] {
        match &self.sequence {
            Some(sequence) => sequence.steps(),
            None => &[],
        }
    }

    /// Ends the workset.
    ///
    /// Works still accumulated are registered as the final step of the
    /// sequence, but the accumulation stays open so the next workset can add
    /// to the same composite request. The returned signal settles once every
    /// step of this workset has settled; it never reports failures.
    pub fn end(mut self) -> Settled {
        self.finish()
    }

    fn finish(&mut self) -> Settled {
        let Some(mut sequence) = self.sequence.take() else {
            return self.processor.latest.clone();
        };

        self.processor.bulker.flush_if_needed(&mut sequence);
        let settled = sequence.build();
        self.processor.latest = settled.clone();
        settled
    }
}

impl<T: Transport> Drop for WorksetGuard<'_, T> {
    fn drop(&mut self) {
        if self.sequence.is_some() {
            let _ = self.finish();
        }
    }
}
