//! Units of remote execution.
//!
//! A work is either merged into a composite request ([`BulkableWork`]) or sent
//! on its own ([`NonBulkableWork`]). The [`Work`] enum carries that tag so the
//! aggregator can route every submission with a single `match`.

use crate::{ExecutionContext, Result, Transport};
use futures::future::BoxFuture;

/// A work that can be merged into a composite request.
pub trait BulkableWork<T: Transport>: Send + 'static {
    /// Value the work resolves to.
    type Output: Send + 'static;

    /// Builds this work's contribution to the composite request.
    fn bulk_item(&self) -> T::BulkItem;

    /// Interprets the response item aligned with this work.
    ///
    /// Returning an `Err` fails this work only; its siblings in the same
    /// composite request are unaffected.
    fn handle_bulk_item(self: Box<Self>, response: T::BulkItemResponse) -> Result<Self::Output>;
}

/// A work that must be sent as its own request.
pub trait NonBulkableWork<T: Transport>: Send + 'static {
    /// Value the work resolves to.
    type Output: Send + 'static;

    /// Performs the request. Invoked exactly once.
    fn execute(self: Box<Self>, context: ExecutionContext<T>) -> BoxFuture<'static, Result<Self::Output>>;
}

/// A work ready for submission, tagged with how it must be executed.
pub enum Work<T: Transport, O> {
    /// Accumulated with other bulkable works into one composite request.
    Bulkable(Box<dyn BulkableWork<T, Output = O>>),
    /// Executed as a standalone step of the sequence.
    NonBulkable(Box<dyn NonBulkableWork<T, Output = O>>),
}

impl<T: Transport, O> Work<T, O> {
    /// Wraps a bulkable work.
    pub fn bulkable<W>(work: W) -> Self
    where
        W: BulkableWork<T, Output = O>,
    {
        Self::Bulkable(Box::new(work))
    }

    /// Wraps a non-bulkable work.
    pub fn non_bulkable<W>(work: W) -> Self
    where
        W: NonBulkableWork<T, Output = O>,
    {
        Self::NonBulkable(Box::new(work))
    }

    /// Returns `true` if this work can be merged into a composite request.
    pub const fn is_bulkable(&self) -> bool {
        matches!(self, Self::Bulkable(_))
    }
}

impl<T: Transport, O> core::fmt::Debug for Work<T, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bulkable(_) => f.write_str("Work::Bulkable"),
            Self::NonBulkable(_) => f.write_str("Work::NonBulkable"),
        }
    }
}
