//! The immutable chain object returned after every step or flag access.

use crate::deferred::{AsyncOp, Deferred, SyncOp};
use crate::error::ChainError;
use crate::pipeline::PipelineInner;
use crate::state::State;
use crate::step::{StepFn, StepName};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use tracing::{debug, warn};

/// The state field holding the ordered log of every flag read so far.
pub(crate) const FLAG_LOG_FIELD: &str = "flags";

/// An immutable snapshot of a lazily-evaluated pipeline run.
///
/// A chain wraps exactly one deferred state. Calling [`Chain::step`] or
/// [`Chain::flag`] executes nothing; it queues the transformation and
/// returns a brand-new chain, leaving the receiver untouched. Work only
/// happens when the chain is resolved: by `.await` (the [`IntoFuture`]
/// impl), [`Chain::resolve`], [`Chain::then`], [`Chain::catch`], or
/// [`Chain::finally`].
///
/// Chains are cheap to clone, and clones share the same memoized state:
/// each queued step body runs at most once per call site no matter how many
/// clones are resolved. Cloning before a step call is also how chains
/// branch — siblings never observe each other's transformations.
///
/// # Examples
///
/// ```
/// use kusari::{Pipeline, State};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kusari::ChainError> {
/// let pipeline = Pipeline::builder()
///     .step("double", |state, _args| match state {
///         State::Int(n) => Ok(Some(State::Int(n * 2))),
///         other => Ok(Some(other)),
///     })
///     .build()?;
///
/// let result = pipeline
///     .start([State::from(3)])
///     .step("double", [])?
///     .step("double", [])?
///     .await?;
/// assert_eq!(result, State::Int(12));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Chain {
    pipeline: Arc<PipelineInner>,
    state: Deferred,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("steps", &self.pipeline.steps.keys().collect::<Vec<_>>())
            .field("flags", &self.pipeline.flags)
            .field("synchronous", &self.state.is_sync())
            .finish()
    }
}

impl Chain {
    pub(crate) fn new(pipeline: Arc<PipelineInner>, state: Deferred) -> Self {
        Chain { pipeline, state }
    }

    /// Queues a step call and returns the new chain.
    ///
    /// The step function itself runs only at resolution time, strictly
    /// after every previously queued step, and at most once for this call
    /// site. A step function returning `Ok(None)` leaves the threaded
    /// state unchanged (the no-op convention); `Ok(Some(state))` replaces
    /// it; `Err` rejects the chain and short-circuits everything queued
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::StepNotFound`] immediately when the pipeline
    /// does not declare `name`.
    pub fn step(
        &self,
        name: impl AsRef<str>,
        args: impl IntoIterator<Item = State>,
    ) -> Result<Chain, ChainError> {
        let name = name.as_ref();
        let step = self
            .pipeline
            .steps
            .get(name)
            .ok_or_else(|| ChainError::StepNotFound(StepName::new(name)))?
            .clone();
        let step_name = StepName::new(name);
        let args: Vec<State> = args.into_iter().collect();

        let state = match step {
            StepFn::Sync(f) => {
                let op: SyncOp = Arc::new(move |state: State| {
                    debug!(step = %step_name, "executing step");
                    match f(state.clone(), args.clone()) {
                        Ok(Some(next)) => Ok(next),
                        Ok(None) => Ok(state),
                        Err(error) => {
                            warn!(step = %step_name, %error, "step failed");
                            Err(error)
                        }
                    }
                });
                self.state.chain_sync(op)
            }
            StepFn::Async(f) => {
                let op: AsyncOp = Arc::new(move |state: State| {
                    debug!(step = %step_name, "executing step");
                    let prior = state.clone();
                    let step_name = step_name.clone();
                    let future = f(state, args.clone());
                    async move {
                        match future.await {
                            Ok(Some(next)) => Ok(next),
                            Ok(None) => Ok(prior),
                            Err(error) => {
                                warn!(step = %step_name, %error, "step failed");
                                Err(error)
                            }
                        }
                    }
                    .boxed()
                });
                self.state.chain_async(op)
            }
        };

        Ok(Chain::new(self.pipeline.clone(), state))
    }

    /// Queues a flag read and returns the new chain.
    ///
    /// Reading a flag is itself a step: it derives a child record whose own
    /// field `name` is the inherited tally (0 when unset or non-integer)
    /// plus one, and whose own `"flags"` field is the inherited read log
    /// with `name` appended. The derivation never writes to ancestor
    /// layers, so sibling flags and sibling chains are undisturbed.
    ///
    /// Flag reads are synchronous ops: a chain built only from flags keeps
    /// the [`Chain::try_value`] escape hatch.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::FlagNotFound`] immediately when the pipeline
    /// does not declare `name`. A flag read over a non-record state rejects
    /// the chain at resolution time with [`ChainError::FlagTarget`].
    pub fn flag(&self, name: &str) -> Result<Chain, ChainError> {
        if !self.pipeline.flags.iter().any(|f| f.as_str() == name) {
            return Err(ChainError::FlagNotFound(StepName::new(name)));
        }
        let flag = StepName::new(name);

        let op: SyncOp = Arc::new(move |state: State| match state {
            State::Record(record) => {
                debug!(flag = %flag, "reading flag");
                let count = match record.get(flag.as_str()) {
                    Some(State::Int(n)) => *n,
                    _ => 0,
                };
                let mut log = match record.get(FLAG_LOG_FIELD) {
                    Some(State::List(entries)) => entries.clone(),
                    _ => Vec::new(),
                };
                log.push(State::Text(flag.as_str().to_string()));
                let derived = record.derive([
                    (flag.as_str().to_string(), State::Int(count + 1)),
                    (FLAG_LOG_FIELD.to_string(), State::List(log)),
                ]);
                Ok(State::Record(derived))
            }
            other => Err(ChainError::FlagTarget {
                flag: flag.clone(),
                found: other.kind(),
            }),
        });

        Ok(Chain::new(self.pipeline.clone(), self.state.chain_sync(op)))
    }

    /// Resolves the chain: runs every queued step in call order, applies
    /// the configured finalizer (if any) exactly once to the final state,
    /// and returns the result.
    ///
    /// Awaiting a chain does the same thing; `chain.await` is
    /// `chain.resolve().await`.
    pub async fn resolve(self) -> Result<State, ChainError> {
        let state = self.state.resolve().await?;
        match &self.pipeline.finalizer {
            Some(finalizer) => finalizer.apply(state).await,
            None => Ok(state),
        }
    }

    /// Resolves the chain and maps the success value.
    pub async fn then<T, F>(self, on_resolved: F) -> Result<T, ChainError>
    where
        F: FnOnce(State) -> T,
    {
        self.resolve().await.map(on_resolved)
    }

    /// Resolves the chain, handing a rejection to `on_rejected`.
    ///
    /// The handler may recover by returning `Ok`, or rethrow (the same or
    /// another error) by returning `Err`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kusari::{ChainError, Pipeline, State};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), ChainError> {
    /// let pipeline = Pipeline::builder()
    ///     .step("explode", |_state, _args| {
    ///         Err(ChainError::step("explode", "boom"))
    ///     })
    ///     .build()?;
    ///
    /// let result = pipeline
    ///     .start([State::from(1)])
    ///     .step("explode", [])?
    ///     .catch(|_error| Ok(State::Null))
    ///     .await?;
    /// assert_eq!(result, State::Null);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn catch<F>(self, on_rejected: F) -> Result<State, ChainError>
    where
        F: FnOnce(ChainError) -> Result<State, ChainError>,
    {
        match self.resolve().await {
            Ok(state) => Ok(state),
            Err(error) => on_rejected(error),
        }
    }

    /// Resolves the chain, running `on_final` afterwards regardless of the
    /// outcome, and passes the result through.
    pub async fn finally<F>(self, on_final: F) -> Result<State, ChainError>
    where
        F: FnOnce(),
    {
        let result = self.resolve().await;
        on_final();
        result
    }

    /// Synchronous escape hatch.
    ///
    /// When the chain has been built purely from synchronous steps and flag
    /// reads (it has never touched a real future), this runs the queued
    /// ops now and returns the raw threaded state without awaiting and
    /// without applying the finalizer. Returns `None` once any
    /// asynchronous step (or async `init`) is involved.
    pub fn try_value(&self) -> Option<Result<State, ChainError>> {
        self.state.force().cloned()
    }
}

impl IntoFuture for Chain {
    type Output = Result<State, ChainError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve().boxed()
    }
}
