use crate::{Error, Result};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::oneshot;

/// Sending half of a [`WorkFuture`]. Consumed when the work settles.
pub(crate) type Completer<O> = oneshot::Sender<Result<O>>;

/// Creates a connected completer / future pair for one work.
pub(crate) fn work_channel<O>() -> (Completer<O>, WorkFuture<O>) {
    let (tx, rx) = oneshot::channel();
    (tx, WorkFuture { rx })
}

pin_project! {
    /// A future resolving to the result of a single submitted work.
    ///
    /// The future settles exactly once, when the step that carries the work
    /// (standalone or composite) has executed. If the work is dropped before
    /// that happens, for example because its processor was dropped before the
    /// batch ended, the future resolves to [`Error::Abandoned`].
    ///
    /// Work futures are independent from each other: awaiting one never drives
    /// the execution of another, and dropping one does not cancel the work.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    #[derive(Debug)]
    pub struct WorkFuture<O> {
        #[pin]
        rx: oneshot::Receiver<Result<O>>,
    }
}

impl<O> Future for WorkFuture<O> {
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(Error::Abandoned)),
        }
    }
}

/// A completion signal that never fails.
///
/// Returned for whole sequences (`end` of a workset), for batches
/// (`end_batch`) and used internally for composite executions. It resolves
/// once everything it covers has *settled*, whether the individual works
/// succeeded or not. Failures are observed through each [`WorkFuture`].
///
/// `Settled` is cheap to clone; every clone resolves at the same time.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Clone)]
pub struct Settled {
    inner: Shared<BoxFuture<'static, ()>>,
}

impl Settled {
    /// Wraps a future whose completion marks the settlement.
    ///
    /// The future is lazy: it only makes progress while a clone of the
    /// returned `Settled` is polled.
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// Returns an already settled signal.
    pub fn ready() -> Self {
        Self::new(futures::future::ready(()))
    }

    /// Returns `true` if a clone of this signal has already observed
    /// completion.
    pub fn is_settled(&self) -> bool {
        self.inner.peek().is_some()
    }
}

impl Default for Settled {
    fn default() -> Self {
        Self::ready()
    }
}

impl Future for Settled {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl core::fmt::Debug for Settled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Settled")
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn work_future_yields_sent_result() {
        let (tx, fut) = work_channel::<u32>();
        tx.send(Ok(7)).unwrap();
        assert_eq!(fut.await, Ok(7));
    }

    #[tokio::test]
    async fn dropped_completer_abandons_work() {
        let (tx, fut) = work_channel::<u32>();
        drop(tx);
        assert_eq!(fut.await, Err(Error::Abandoned));
    }

    #[tokio::test]
    async fn settled_clones_resolve_together() {
        let (tx, rx) = oneshot::channel::<()>();
        let settled = Settled::new(async move {
            let _ = rx.await;
        });
        let clone = settled.clone();

        assert!(settled.clone().now_or_never().is_none());
        tx.send(()).unwrap();
        settled.await;
        assert!(clone.is_settled());
        clone.await;
    }

    #[test]
    fn ready_is_settled_once_polled() {
        let settled = Settled::ready();
        assert!(settled.clone().now_or_never().is_some());
        assert!(settled.is_settled());
    }
}
