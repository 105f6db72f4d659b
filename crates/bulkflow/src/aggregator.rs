use crate::{
    BulkableWork, Bulker, NonBulkableWork, SequenceBuilder, Transport, Work, future::Completer,
};
use core::num::NonZeroUsize;

/// Routes each submitted work to the bulker or to a standalone step.
///
/// The aggregator only lives for the duration of one submission. It borrows
/// the processor's bulker and the open workset's sequence.
pub(crate) struct Aggregator<'a, T: Transport> {
    bulker: &'a mut Bulker<T>,
    sequence: &'a mut SequenceBuilder<T>,
    max_bulk_size: NonZeroUsize,
}

impl<'a, T: Transport> Aggregator<'a, T> {
    pub(crate) const fn new(
        bulker: &'a mut Bulker<T>,
        sequence: &'a mut SequenceBuilder<T>,
        max_bulk_size: NonZeroUsize,
    ) -> Self {
        Self {
            bulker,
            sequence,
            max_bulk_size,
        }
    }

    pub(crate) fn aggregate<O>(&mut self, work: Work<T, O>, completer: Completer<O>)
    where
        O: Send + 'static,
    {
        match work {
            Work::Bulkable(work) => self.add_bulkable(work, completer),
            Work::NonBulkable(work) => self.add_non_bulkable(work, completer),
        }
    }

    fn add_bulkable<O>(&mut self, work: Box<dyn BulkableWork<T, Output = O>>, completer: Completer<O>)
    where
        O: Send + 'static,
    {
        self.bulker.add(work, completer);

        if self.bulker.pending_len() >= self.max_bulk_size.get() {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                max_bulk_size = self.max_bulk_size.get(),
                "Bulk is full, releasing"
            );
            self.release_pending_bulk();
        }
    }

    fn add_non_bulkable<O>(
        &mut self,
        work: Box<dyn NonBulkableWork<T, Output = O>>,
        completer: Completer<O>,
    ) where
        O: Send + 'static,
    {
        // Works submitted before this one hit the wire first: the pending bulk
        // becomes a step ahead of this work and is released immediately.
        self.release_pending_bulk();
        self.sequence.add_non_bulk_execution_with(work, completer);
    }

    fn release_pending_bulk(&mut self) {
        self.bulker.flush_if_needed(self.sequence);
        self.bulker.finalize();
    }
}
