//! Synchronous-or-asynchronous stage results.
//!
//! Every stage of the pipeline (interceptors, the dispatch stage, the
//! coalescer) returns a [`Step`]. A `Ready` step carries its outcome right
//! away, a `Pending` step carries a future that settles later. Chaining with
//! [`Step::and_then`] stays synchronous as long as every step is `Ready`, so a
//! request whose stages never suspend reaches the transport without an
//! asynchronous hop.
//!
//! A `Step` can be awaited directly:
//!
//! ```rust,no_run
//! # async fn demo(dispatcher: gosub_net::net::Dispatcher) -> Result<(), gosub_net::NetError> {
//! let response = dispatcher.get("https://example.com/api/items").await?;
//! println!("status {}", response.status());
//! # Ok(()) }
//! ```
use std::future::{Future, IntoFuture};

use futures::future::{self, BoxFuture, FutureExt};

use crate::errors::NetError;

/// Outcome of one pipeline stage.
pub enum Step<T> {
    /// The stage finished immediately.
    Ready(Result<T, NetError>),
    /// The stage suspended; the future yields its outcome.
    Pending(BoxFuture<'static, Result<T, NetError>>),
}

impl<T: Send + 'static> Step<T> {
    /// A successful, immediately available value.
    pub fn ready(value: T) -> Self {
        Step::Ready(Ok(value))
    }

    /// An immediately available failure.
    pub fn failed(err: NetError) -> Self {
        Step::Ready(Err(err))
    }

    /// Wraps a future into a pending step.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, NetError>> + Send + 'static,
    {
        Step::Pending(fut.boxed())
    }

    /// Returns `true` when the outcome is already available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Step::Ready(_))
    }

    /// Feeds the outcome of this step into `next`.
    ///
    /// `next` runs right away when this step is ready, otherwise it runs once
    /// the pending future settles.
    pub fn and_then<U, F>(self, next: F) -> Step<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T, NetError>) -> Step<U> + Send + 'static,
    {
        match self {
            Step::Ready(outcome) => next(outcome),
            Step::Pending(fut) => Step::Pending(
                async move {
                    let outcome = fut.await;
                    next(outcome).settle().await
                }
                .boxed(),
            ),
        }
    }

    /// Waits for the outcome.
    pub async fn settle(self) -> Result<T, NetError> {
        match self {
            Step::Ready(outcome) => outcome,
            Step::Pending(fut) => fut.await,
        }
    }
}

impl<T: Send + 'static> IntoFuture for Step<T> {
    type Output = Result<T, NetError>;
    type IntoFuture = BoxFuture<'static, Result<T, NetError>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Step::Ready(outcome) => future::ready(outcome).boxed(),
            Step::Pending(fut) => fut,
        }
    }
}

impl<T> std::fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Ready(Ok(_)) => f.write_str("Step::Ready(Ok(..))"),
            Step::Ready(Err(e)) => write!(f, "Step::Ready(Err({e}))"),
            Step::Pending(_) => f.write_str("Step::Pending(..)"),
        }
    }
}
