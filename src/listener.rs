//! Listener definitions

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Outcome of a single listener invocation
pub type ListenerResult = Result<(), ListenerError>;

type SyncCallback<P> = dyn Fn(&P) -> ListenerResult + Send + Sync;
type AsyncCallback<P> = dyn Fn(Arc<P>) -> BoxFuture<'static, ListenerResult> + Send + Sync;

/// How a listener completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Runs to completion before returning
    Sync,

    /// Returns a pending completion
    Async,
}

enum Callback<P> {
    Sync(Arc<SyncCallback<P>>),
    Async(Arc<AsyncCallback<P>>),
}

/// A registered callable for events carrying payload `P`.
///
/// The kind is fixed when the listener is built. Clones share the same callable
/// and compare equal under [`Listener::same_as`]; two listeners built from
/// identical closures do not.
pub struct Listener<P> {
    callback: Callback<P>,
}

impl<P: Send + Sync + 'static> Listener<P> {
    /// Create a synchronous listener
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let listener = Listener::from_fn(|data: &DataPayload| {
    ///     println!("received {}", data.first);
    ///     Ok(())
    /// });
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&P) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            callback: Callback::Sync(Arc::new(f)),
        }
    }

    /// Create an asynchronous listener
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let listener = Listener::from_async(|data: Arc<DataPayload>| async move {
    ///     store.save(&data.first).await;
    ///     Ok(())
    /// });
    /// ```
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Self {
            callback: Callback::Async(Arc::new(move |payload: Arc<P>| f(payload).boxed())),
        }
    }

    /// Invoke the listener.
    ///
    /// Sync listeners run to completion here; async listeners only produce
    /// their future, which the caller is responsible for driving.
    pub(crate) fn invoke(&self, payload: &Arc<P>) -> Invocation {
        match &self.callback {
            Callback::Sync(f) => Invocation::Completed(f(&**payload)),
            Callback::Async(f) => Invocation::Pending(f(Arc::clone(payload))),
        }
    }
}

impl<P> Listener<P> {
    /// Get listener kind
    pub fn kind(&self) -> ListenerKind {
        match self.callback {
            Callback::Sync(_) => ListenerKind::Sync,
            Callback::Async(_) => ListenerKind::Async,
        }
    }

    /// Check whether the listener returns a pending completion
    pub fn is_async(&self) -> bool {
        self.kind() == ListenerKind::Async
    }

    /// Check whether both handles refer to the same registered callable
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.callback, &other.callback) {
            (Callback::Sync(a), Callback::Sync(b)) => Arc::ptr_eq(a, b),
            (Callback::Async(a), Callback::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<P> Clone for Listener<P> {
    fn clone(&self) -> Self {
        let callback = match &self.callback {
            Callback::Sync(f) => Callback::Sync(Arc::clone(f)),
            Callback::Async(f) => Callback::Async(Arc::clone(f)),
        };
        Self { callback }
    }
}

impl<P> fmt::Debug for Listener<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

pub(crate) enum Invocation {
    Completed(ListenerResult),
    Pending(BoxFuture<'static, ListenerResult>),
}

/// Listener error
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ListenerError {
    /// Create a failure with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_listener_kind() {
        let sync = Listener::<u32>::from_fn(|_| Ok(()));
        let async_listener = Listener::<u32>::from_async(|_| async { Ok(()) });

        assert_eq!(sync.kind(), ListenerKind::Sync);
        assert!(!sync.is_async());
        assert_eq!(async_listener.kind(), ListenerKind::Async);
        assert!(async_listener.is_async());
    }

    #[test]
    fn test_listener_identity() {
        let first = Listener::<u32>::from_fn(|_| Ok(()));
        let second = Listener::<u32>::from_fn(|_| Ok(()));
        let first_clone = first.clone();

        assert!(first.same_as(&first_clone));
        assert!(!first.same_as(&second));
    }

    #[test]
    fn test_sync_invocation_runs_inline() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        let listener = Listener::from_fn(move |value: &u32| {
            seen.fetch_add(*value, Ordering::SeqCst);
            Ok(())
        });

        match listener.invoke(&Arc::new(3)) {
            Invocation::Completed(result) => assert!(result.is_ok()),
            Invocation::Pending(_) => panic!("sync listener returned a future"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_async_invocation_is_lazy() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        let listener = Listener::from_async(move |value: Arc<u32>| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(*value, Ordering::SeqCst);
                Ok(())
            }
        });

        let future = match listener.invoke(&Arc::new(5)) {
            Invocation::Pending(future) => future,
            Invocation::Completed(_) => panic!("async listener completed inline"),
        };
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        future.await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_listener_error_display() {
        let err = ListenerError::failed("boom");
        assert_eq!(err.to_string(), "Listener failed: boom");
    }
}
