//! Error types for work orchestration.
//!
//! Every failure the core can observe ends up on exactly one place: the
//! [`WorkFuture`](crate::WorkFuture) of the work it belongs to. Sequence and
//! batch completion futures never carry an error.
//!
//! ## Error Cases
//! - `Request`: the execution (composite or standalone) could not be
//!   completed. Every work that was part of it fails with the same value.
//! - `Item`: the execution succeeded but reported a failure for one item.
//! - `MalformedBulkResponse`: a composite response did not line up with its
//!   request. Handled like a request-level failure.
//! - `Abandoned`: the work was dropped before producing a result.
//! - `ServiceShutdown` / `ChannelError`: the batching orchestrator could not
//!   accept or acknowledge a workset.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the orchestration core.
///
/// The type is `Clone` so that a single request-level failure can be handed
/// to every work of a composite execution.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The underlying request failed as a whole (transport error, timeout,
    /// unreadable response, ...).
    #[error("Request failed: {reason}")]
    Request { reason: String },

    /// The request succeeded, but the remote service rejected this item.
    #[error("Item failed: {reason}")]
    Item { reason: String },

    /// A composite response reported a different number of items than the
    /// request carried.
    #[error("Malformed bulk response: expected {expected} items, got {actual}")]
    MalformedBulkResponse { expected: usize, actual: usize },

    /// The work was dropped before it produced a result.
    #[error("Work was abandoned before completion")]
    Abandoned,

    /// The orchestrator is shutting down and refuses new worksets.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Builds a request-level failure from anything displayable.
    pub fn request(reason: impl core::fmt::Display) -> Self {
        Self::Request {
            reason: reason.to_string(),
        }
    }

    /// Builds an item-level failure from anything displayable.
    pub fn item(reason: impl core::fmt::Display) -> Self {
        Self::Item {
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if this failure applies to a whole execution rather than
    /// a single item of it.
    pub const fn is_request_level(&self) -> bool {
        matches!(
            self,
            Self::Request { .. } | Self::MalformedBulkResponse { .. }
        )
    }
}
