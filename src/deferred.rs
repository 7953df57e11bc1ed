//! The deferred state cell behind every chain snapshot.

use crate::error::ChainError;
use crate::state::State;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::Future;
use std::sync::{Arc, OnceLock};

/// Result of resolving the threaded state.
pub(crate) type StateResult = Result<State, ChainError>;

/// A queued synchronous transformation of the threaded state.
pub(crate) type SyncOp = Arc<dyn Fn(State) -> StateResult + Send + Sync>;

/// A queued asynchronous transformation of the threaded state.
pub(crate) type AsyncOp = Arc<dyn Fn(State) -> BoxFuture<'static, StateResult> + Send + Sync>;

type SharedStateFuture = Shared<BoxFuture<'static, StateResult>>;

/// A lazily evaluated, memoized deferred state.
///
/// This is the tagged union distinguishing the "synchronous stub" side from
/// real futures:
///
/// - `Ready` — a settled value with nothing queued on top of it.
/// - `Thunk` — a synchronous op queued over a synchronous predecessor.
///   Nothing runs until [`Deferred::force`] or [`Deferred::resolve`] is
///   called; the result is memoized so the op body runs at most once no
///   matter how many clones are resolved.
/// - `Future` — a shared boxed future. Lazy until first polled, memoized
///   across clones by `futures::future::Shared` afterwards.
///
/// Invariant: the predecessor of a `Thunk` is never a `Future`
/// ([`Deferred::chain_sync`] degrades to a future instead), so the whole
/// synchronous side can be forced without an executor.
#[derive(Clone)]
pub(crate) struct Deferred {
    inner: Arc<Inner>,
}

enum Inner {
    Ready(StateResult),
    Thunk {
        prev: Deferred,
        op: SyncOp,
        memo: OnceLock<StateResult>,
    },
    Future(SharedStateFuture),
}

impl Deferred {
    /// Wraps an already-settled value.
    pub(crate) fn ready(result: StateResult) -> Self {
        Deferred {
            inner: Arc::new(Inner::Ready(result)),
        }
    }

    /// Wraps a real future. The future is boxed and shared; it starts
    /// running at first poll and settles once for all clones.
    pub(crate) fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = StateResult> + Send + 'static,
    {
        Deferred {
            inner: Arc::new(Inner::Future(future.boxed().shared())),
        }
    }

    /// Returns `true` while the chain has never touched a real future.
    pub(crate) fn is_sync(&self) -> bool {
        !matches!(&*self.inner, Inner::Future(_))
    }

    /// Queues a synchronous op. Stays on the synchronous side when the
    /// predecessor is synchronous, otherwise degrades to a future.
    pub(crate) fn chain_sync(&self, op: SyncOp) -> Self {
        if self.is_sync() {
            Deferred {
                inner: Arc::new(Inner::Thunk {
                    prev: self.clone(),
                    op,
                    memo: OnceLock::new(),
                }),
            }
        } else {
            let prev = self.clone();
            Deferred::from_future(async move {
                let state = prev.resolve().await?;
                op(state)
            })
        }
    }

    /// Queues an asynchronous op. The result is always a future.
    pub(crate) fn chain_async(&self, op: AsyncOp) -> Self {
        let prev = self.clone();
        Deferred::from_future(async move {
            let state = prev.resolve().await?;
            op(state).await
        })
    }

    /// Runs the queued synchronous ops now and returns the settled result,
    /// or `None` if the chain has touched a real future.
    pub(crate) fn force(&self) -> Option<&StateResult> {
        match &*self.inner {
            Inner::Ready(result) => Some(result),
            Inner::Thunk { prev, op, memo } => {
                let result = memo.get_or_init(|| match prev.force() {
                    Some(Ok(state)) => op(state.clone()),
                    Some(Err(error)) => Err(error.clone()),
                    // Unreachable: thunk predecessors are synchronous by
                    // construction.
                    None => Err(ChainError::Configuration(
                        "pending future on the synchronous path".to_string(),
                    )),
                });
                Some(result)
            }
            Inner::Future(_) => None,
        }
    }

    /// Resolves the deferred state, running whatever is still queued.
    pub(crate) async fn resolve(&self) -> StateResult {
        match &*self.inner {
            Inner::Future(shared) => shared.clone().await,
            _ => match self.force() {
                Some(result) => result.clone(),
                None => Err(ChainError::Configuration(
                    "pending future on the synchronous path".to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn add_op(amount: i64, runs: Arc<AtomicUsize>) -> SyncOp {
        Arc::new(move |state| {
            runs.fetch_add(1, Ordering::SeqCst);
            match state {
                State::Int(n) => Ok(State::Int(n + amount)),
                other => Ok(other),
            }
        })
    }

    #[test]
    fn test_thunks_are_lazy_and_memoized() {
        let runs = Arc::new(AtomicUsize::new(0));
        let deferred = Deferred::ready(Ok(State::Int(1)))
            .chain_sync(add_op(1, runs.clone()))
            .chain_sync(add_op(10, runs.clone()));

        // Nothing ran at queue time.
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(deferred.force(), Some(&Ok(State::Int(12))));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Forcing again replays nothing.
        assert_eq!(deferred.force(), Some(&Ok(State::Int(12))));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sync_error_short_circuits() {
        let runs = Arc::new(AtomicUsize::new(0));
        let failing: SyncOp = Arc::new(|_| Err(ChainError::step("boom", "failed")));
        let deferred = Deferred::ready(Ok(State::Int(1)))
            .chain_sync(failing)
            .chain_sync(add_op(1, runs.clone()));

        assert_eq!(deferred.force(), Some(&Err(ChainError::step("boom", "failed"))));
        // The op queued after the failure never ran.
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_future_side_has_no_sync_value() {
        let deferred = Deferred::from_future(async { Ok(State::Int(1)) });
        assert!(!deferred.is_sync());
        assert!(deferred.force().is_none());
    }

    #[test]
    fn test_chain_sync_over_future_degrades() {
        let runs = Arc::new(AtomicUsize::new(0));
        let deferred =
            Deferred::from_future(async { Ok(State::Int(1)) }).chain_sync(add_op(1, runs.clone()));

        assert!(!deferred.is_sync());
        let result = tokio_test::block_on(deferred.resolve());
        assert_eq!(result, Ok(State::Int(2)));
    }

    #[test]
    fn test_shared_future_settles_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let probe = runs.clone();
        let deferred = Deferred::from_future(async move {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(State::Int(1))
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(tokio_test::block_on(deferred.resolve()), Ok(State::Int(1)));
        assert_eq!(tokio_test::block_on(deferred.resolve()), Ok(State::Int(1)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_async_op_threads_state() {
        let op: AsyncOp = Arc::new(|state| {
            async move {
                match state {
                    State::Int(n) => Ok(State::Int(n * 2)),
                    other => Ok(other),
                }
            }
            .boxed()
        });
        let deferred = Deferred::ready(Ok(State::Int(21))).chain_async(op);

        assert!(!deferred.is_sync());
        assert_eq!(tokio_test::block_on(deferred.resolve()), Ok(State::Int(42)));
    }
}
