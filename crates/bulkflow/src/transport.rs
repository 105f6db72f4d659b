//! Boundary between the orchestration core and the network.
//!
//! The core never builds request bodies nor talks HTTP. It only needs two
//! things from the outside world:
//!
//! - a [`Transport`] able to send one composite request made of the
//!   contributions of several bulkable works, and
//! - an [`ExecutionContext`] handed to non-bulkable works so they can perform
//!   their own request.

use crate::Result;
use std::sync::Arc;

/// Sends composite (bulk) requests on behalf of the orchestration core.
///
/// Implementations own the wire format: they turn the ordered list of
/// [`BulkItem`](Transport::BulkItem)s into one request, send it, and split the
/// response back into one outcome per item.
pub trait Transport: Send + Sync + 'static {
    /// One work's contribution to a composite request.
    type BulkItem: Send + 'static;

    /// One item of a composite response.
    type BulkItemResponse: Send + 'static;

    /// Sends a single composite request carrying `items`, in order.
    ///
    /// The outer `Result` describes the request as a whole: an `Err` fails
    /// every item with the same cause. On success, the returned vector must
    /// hold exactly one outcome per item, aligned with `items`. A length
    /// mismatch is reported to every item as
    /// [`Error::MalformedBulkResponse`](crate::Error::MalformedBulkResponse).
    fn execute_bulk(
        &self,
        items: Vec<Self::BulkItem>,
    ) -> impl Future<Output = Result<Vec<Result<Self::BulkItemResponse>>>> + Send;
}

/// State shared by every step of a sequence.
///
/// This is a cheap, clonable handle around the transport. The core passes it
/// along untouched.
#[derive(Debug)]
pub struct ExecutionContext<T> {
    transport: Arc<T>,
}

impl<T> ExecutionContext<T> {
    /// Creates a context around a shared transport.
    pub const fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a new shared handle to the transport.
    pub fn shared_transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }
}

impl<T> Clone for ExecutionContext<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T> From<Arc<T>> for ExecutionContext<T> {
    fn from(transport: Arc<T>) -> Self {
        Self::new(transport)
    }
}
