//! The chain factory: pipeline configuration, validation, and start.

use crate::chain::Chain;
use crate::deferred::Deferred;
use crate::error::ChainError;
use crate::state::{Record, State};
use crate::step::{FinalizerFn, InitFn, StepFn, StepName, StepOutput};
use futures::future::FutureExt;
use futures::Future;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Names that may not be used for steps or flags.
///
/// Dispatch is lookup-based, so a step literally named `then` could never
/// shadow the resolution methods, but the names stay reserved to keep
/// configurations portable with the documented reservation.
const RESERVED_NAMES: [&str; 3] = ["init", "then", "flags"];

/// The frozen pipeline configuration shared by every chain it starts.
pub(crate) struct PipelineInner {
    pub(crate) steps: HashMap<StepName, StepFn>,
    pub(crate) flags: Vec<StepName>,
    pub(crate) init: Option<InitFn>,
    pub(crate) finalizer: Option<FinalizerFn>,
}

/// A declarative map of named steps, turned into a factory for lazy,
/// chainable pipeline runs.
///
/// A pipeline is built once via [`Pipeline::builder`] and is immutable
/// afterwards. [`Pipeline::start`] begins a fresh [`Chain`]; chains started
/// from the same pipeline share no mutable state and are fully independent.
///
/// # Examples
///
/// ```
/// use kusari::{Pipeline, State};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), kusari::ChainError> {
/// let pipeline = Pipeline::builder()
///     .step("square", |state, _args| match state {
///         State::Int(n) => Ok(Some(State::Int(n * n))),
///         other => Ok(Some(other)),
///     })
///     .build()?;
///
/// let result = pipeline.start([State::from(3)]).step("square", [])?.await?;
/// assert_eq!(result, State::Int(9));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.inner.steps.keys().collect::<Vec<_>>())
            .field("flags", &self.inner.flags)
            .field("has_init", &self.inner.init.is_some())
            .field("has_finalizer", &self.inner.finalizer.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Starts a fresh chain from the given positional arguments.
    ///
    /// The initial state is the result of the configured `init` function
    /// when one is present (a synchronous `init` runs now, an asynchronous
    /// one at first resolution). Without `init` the rule is positional:
    /// exactly one argument becomes the state as-is, several become a
    /// [`State::List`], none becomes an empty [`Record`].
    pub fn start<I>(&self, args: I) -> Chain
    where
        I: IntoIterator<Item = State>,
    {
        let args: Vec<State> = args.into_iter().collect();
        let state = match &self.inner.init {
            Some(InitFn::Sync(f)) => Deferred::ready(f(args)),
            Some(InitFn::Async(f)) => Deferred::from_future(f(args)),
            None => Deferred::ready(Ok(initial_state(args))),
        };
        Chain::new(self.inner.clone(), state)
    }
}

fn initial_state(args: Vec<State>) -> State {
    let mut args = args;
    match args.len() {
        0 => State::Record(Record::new()),
        1 => match args.pop() {
            Some(single) => single,
            None => State::Record(Record::new()),
        },
        _ => State::List(args),
    }
}

/// Builder for constructing [`Pipeline`] instances.
///
/// Step and flag declarations are validated at [`PipelineBuilder::build`]:
/// duplicate step names, duplicate flags, step/flag collisions, and
/// reserved names (`init`, `then`, `flags`) are configuration errors rather
/// than silent overwrites.
#[derive(Default)]
pub struct PipelineBuilder {
    steps: HashMap<StepName, StepFn>,
    flags: Vec<StepName>,
    init: Option<InitFn>,
    finalizer: Option<FinalizerFn>,
    problems: Vec<String>,
}

impl PipelineBuilder {
    /// Creates a new empty pipeline builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a synchronous step.
    ///
    /// The function receives the current state and the call-site arguments.
    /// Return `Ok(Some(state))` to replace the threaded state, `Ok(None)`
    /// to keep it unchanged, or `Err` to reject the chain.
    pub fn step<F>(mut self, name: impl Into<StepName>, f: F) -> Self
    where
        F: Fn(State, Vec<State>) -> StepOutput + Send + Sync + 'static,
    {
        self.insert_step(name.into(), StepFn::Sync(Arc::new(f)));
        self
    }

    /// Declares an asynchronous step.
    ///
    /// Same contract as [`PipelineBuilder::step`], with the output behind a
    /// future. Declaring any async step (or async init) makes chains
    /// asynchronous and disables the [`Chain::try_value`] escape hatch.
    pub fn async_step<F, Fut>(mut self, name: impl Into<StepName>, f: F) -> Self
    where
        F: Fn(State, Vec<State>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepOutput> + Send + 'static,
    {
        self.insert_step(
            name.into(),
            StepFn::Async(Arc::new(move |state, args| f(state, args).boxed())),
        );
        self
    }

    /// Declares a flag.
    ///
    /// Each declared flag becomes readable on every chain via
    /// [`Chain::flag`]; reading it increments its tally inside the state
    /// and appends the name to the ordered `"flags"` log.
    pub fn flag(mut self, name: impl Into<StepName>) -> Self {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            self.problems.push(format!("reserved flag name: '{name}'"));
        } else if self.flags.contains(&name) {
            self.problems.push(format!("duplicate flag name: '{name}'"));
        } else {
            self.flags.push(name);
        }
        self
    }

    /// Declares several flags at once, in order.
    pub fn flags<I, N>(self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<StepName>,
    {
        names.into_iter().fold(self, |builder, name| builder.flag(name))
    }

    /// Sets the synchronous `init` function producing the initial state
    /// from the positional start arguments. Runs at [`Pipeline::start`].
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<State>) -> Result<State, ChainError> + Send + Sync + 'static,
    {
        self.init = Some(InitFn::Sync(Arc::new(f)));
        self
    }

    /// Sets an asynchronous `init` function. Runs at first resolution.
    pub fn async_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Vec<State>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, ChainError>> + Send + 'static,
    {
        self.init = Some(InitFn::Async(Arc::new(move |args| f(args).boxed())));
        self
    }

    /// Sets the finalizer, applied exactly once per resolution to the
    /// fully-threaded final state.
    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(State) -> Result<State, ChainError> + Send + Sync + 'static,
    {
        self.finalizer = Some(FinalizerFn::Sync(Arc::new(f)));
        self
    }

    /// Sets an asynchronous finalizer.
    pub fn async_finalize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, ChainError>> + Send + 'static,
    {
        self.finalizer = Some(FinalizerFn::Async(Arc::new(move |state| f(state).boxed())));
        self
    }

    fn insert_step(&mut self, name: StepName, step: StepFn) {
        if RESERVED_NAMES.contains(&name.as_str()) {
            self.problems.push(format!("reserved step name: '{name}'"));
            return;
        }
        if self.steps.contains_key(&name) {
            self.problems.push(format!("duplicate step name: '{name}'"));
            return;
        }
        self.steps.insert(name, step);
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Configuration`] for duplicate step names,
    /// duplicate flags, step/flag collisions, or reserved names used as
    /// steps or flags.
    pub fn build(mut self) -> Result<Pipeline, ChainError> {
        for flag in &self.flags {
            if self.steps.contains_key(flag) {
                self.problems
                    .push(format!("name '{flag}' declared as both step and flag"));
            }
        }
        if let Some(problem) = self.problems.into_iter().next() {
            return Err(ChainError::Configuration(problem));
        }

        Ok(Pipeline {
            inner: Arc::new(PipelineInner {
                steps: self.steps,
                flags: self.flags,
                init: self.init,
                finalizer: self.finalizer,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_duplicate_step() {
        let result = Pipeline::builder()
            .step("a", |state, _| Ok(Some(state)))
            .step("a", |state, _| Ok(Some(state)))
            .build();
        assert_eq!(
            result.err(),
            Some(ChainError::Configuration(
                "duplicate step name: 'a'".to_string()
            ))
        );
    }

    #[test]
    fn test_builder_rejects_reserved_names() {
        let result = Pipeline::builder()
            .step("then", |state, _| Ok(Some(state)))
            .build();
        assert_eq!(
            result.err(),
            Some(ChainError::Configuration(
                "reserved step name: 'then'".to_string()
            ))
        );

        let result = Pipeline::builder().flag("flags").build();
        assert_eq!(
            result.err(),
            Some(ChainError::Configuration(
                "reserved flag name: 'flags'".to_string()
            ))
        );
    }

    #[test]
    fn test_builder_rejects_step_flag_collision() {
        let result = Pipeline::builder()
            .step("verbose", |state, _| Ok(Some(state)))
            .flag("verbose")
            .build();
        assert_eq!(
            result.err(),
            Some(ChainError::Configuration(
                "name 'verbose' declared as both step and flag".to_string()
            ))
        );
    }

    #[test]
    fn test_builder_rejects_duplicate_flag() {
        let result = Pipeline::builder().flags(["a", "a"]).build();
        assert_eq!(
            result.err(),
            Some(ChainError::Configuration(
                "duplicate flag name: 'a'".to_string()
            ))
        );
    }

    #[test]
    fn test_initial_state_rule() {
        assert_eq!(initial_state(vec![]), State::Record(Record::new()));
        assert_eq!(initial_state(vec![State::Int(7)]), State::Int(7));
        assert_eq!(
            initial_state(vec![State::Int(1), State::Int(2)]),
            State::List(vec![State::Int(1), State::Int(2)])
        );
    }

    #[test]
    fn test_sync_init_runs_at_start() {
        let pipeline = Pipeline::builder()
            .init(|args| Ok(State::Int(args.len() as i64)))
            .build()
            .expect("valid pipeline");

        let chain = pipeline.start([State::Null, State::Null, State::Null]);
        assert_eq!(chain.try_value(), Some(Ok(State::Int(3))));
    }

    #[tokio::test]
    async fn test_async_init_disables_escape_hatch() {
        let pipeline = Pipeline::builder()
            .async_init(|args| async move { Ok(State::Int(args.len() as i64)) })
            .build()
            .expect("valid pipeline");

        let chain = pipeline.start([State::Null]);
        assert!(chain.try_value().is_none());
        assert_eq!(chain.await, Ok(State::Int(1)));
    }
}
