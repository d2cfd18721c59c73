use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::BootstrapError;

type BoxedResult<T> = Pin<Box<dyn Future<Output = Result<T, BootstrapError>> + Send>>;

/// The eventual outcome of an asynchronous start or stop.
///
/// Resolves to `Ok(T)` or to the failure raised by the provider. Work
/// started through [`Pending::spawn`] runs on the given runtime, so the
/// caller only ever waits on a channel.
#[must_use = "a pending operation does nothing unless awaited"]
pub struct Pending<T> {
    state: State<T>,
}

enum State<T> {
    Ready(Option<Result<T, BootstrapError>>),
    Channel(oneshot::Receiver<Result<T, BootstrapError>>),
    Chained(BoxedResult<T>),
}

impl<T: Send + 'static> Pending<T> {
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Ready(Some(Ok(value))),
        }
    }

    pub fn failed(error: BootstrapError) -> Self {
        Self {
            state: State::Ready(Some(Err(error))),
        }
    }

    /// Run `work` on `handle` and complete once it finishes.
    ///
    /// Returns at once; the result travels back over a oneshot channel. If
    /// the runtime drops the task first the result is
    /// [`BootstrapError::Abandoned`].
    pub fn spawn<F>(handle: &Handle, work: F) -> Self
    where
        F: Future<Output = Result<T, BootstrapError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        handle.spawn(async move {
            // Receiver gone means nobody is waiting any more.
            let _ = tx.send(work.await);
        });
        Self {
            state: State::Channel(rx),
        }
    }

    /// Wrap an existing future without spawning it.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, BootstrapError>> + Send + 'static,
    {
        Self {
            state: State::Chained(Box::pin(future)),
        }
    }

    /// Map the success value; failures pass through untouched.
    pub fn then<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Pending::from_future(async move { self.await.map(f) })
    }

    /// Chain another pending operation on success.
    pub fn compose<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Pending<U> + Send + 'static,
    {
        Pending::from_future(async move {
            let value = self.await?;
            f(value).await
        })
    }

    /// Observe a failure without consuming it.
    pub fn inspect_err<F>(self, f: F) -> Self
    where
        F: FnOnce(&BootstrapError) + Send + 'static,
    {
        Pending::from_future(async move {
            let result = self.await;
            if let Err(e) = &result {
                f(e);
            }
            result
        })
    }

    /// Block the current thread until the operation completes.
    ///
    /// Meant for synchronous callers. Panics if called from inside an async
    /// runtime, like any nested `block_on`.
    pub fn blocking_wait(self) -> Result<T, BootstrapError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self)
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, BootstrapError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(slot) => match slot.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(Err(BootstrapError::Abandoned)),
            },
            State::Channel(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(BootstrapError::Abandoned)),
                Poll::Pending => Poll::Pending,
            },
            State::Chained(future) => future.as_mut().poll(cx),
        }
    }
}

impl<T> Unpin for Pending<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ready_and_failed_resolve_immediately() {
        assert_eq!(Pending::ready(7).await.unwrap(), 7);
        let err = Pending::<i32>::failed(BootstrapError::Abandoned).await;
        assert!(matches!(err, Err(BootstrapError::Abandoned)));
    }

    #[tokio::test]
    async fn spawn_runs_on_handle() {
        let handle = Handle::current();
        let pending = Pending::spawn(&handle, async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BootstrapError>("bound")
        });
        assert_eq!(pending.await.unwrap(), "bound");
    }

    #[tokio::test]
    async fn then_maps_success_and_skips_failure() {
        let doubled = Pending::ready(21).then(|n| n * 2);
        assert_eq!(doubled.await.unwrap(), 42);

        let skipped = Pending::<i32>::failed(BootstrapError::ProviderFailed("boom".into()))
            .then(|_| -> i32 { panic!("continuation must not run on failure") });
        assert!(matches!(skipped.await, Err(BootstrapError::ProviderFailed(_))));
    }

    #[tokio::test]
    async fn compose_chains_and_propagates() {
        let chained = Pending::ready(1).compose(|n| Pending::ready(n + 1));
        assert_eq!(chained.await.unwrap(), 2);

        let failed = Pending::ready(1)
            .compose(|_| Pending::<i32>::failed(BootstrapError::UnsupportedProtocol("gopher".into())));
        assert!(matches!(failed.await, Err(BootstrapError::UnsupportedProtocol(_))));
    }

    #[tokio::test]
    async fn inspect_err_sees_failure() {
        let (tx, rx) = oneshot::channel();
        let result = Pending::<()>::failed(BootstrapError::Abandoned)
            .inspect_err(move |e| {
                let _ = tx.send(e.to_string());
            })
            .await;
        assert!(result.is_err());
        assert_eq!(rx.await.unwrap(), "operation abandoned before completion");
    }

    #[tokio::test]
    async fn dropped_task_is_abandoned() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let pending = Pending::spawn(runtime.handle(), std::future::pending::<Result<(), _>>());
        runtime.shutdown_background();
        assert!(matches!(pending.await, Err(BootstrapError::Abandoned)));
    }

    #[test]
    fn blocking_wait_outside_runtime() {
        let value = Pending::ready("done").compose(|s| Pending::ready(s.len())).blocking_wait();
        assert_eq!(value.unwrap(), 4);
    }
}
