//! Step names and the stored forms of configured functions.

use crate::error::ChainError;
use crate::state::State;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Type-safe step name wrapper.
///
/// Used for step names, flag names, and error reporting, preventing
/// mismatched identifiers at the API level.
///
/// # Examples
///
/// ```
/// use kusari::StepName;
///
/// let name = StepName::new("square");
/// assert_eq!(name.as_str(), "square");
///
/// // From trait for ergonomic conversion
/// let name: StepName = "negate".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What a step function produced.
///
/// `Ok(None)` is the no-op convention: the state after the step equals the
/// state before it. `Ok(Some(state))` replaces the threaded state.
pub type StepOutput = Result<Option<State>, ChainError>;

/// A configured step function, stored in the explicit name-to-function map.
///
/// The sync/async split is load-bearing: a chain built purely from `Sync`
/// steps never touches a real future, which is what keeps the synchronous
/// escape hatch available.
#[derive(Clone)]
pub(crate) enum StepFn {
    Sync(Arc<dyn Fn(State, Vec<State>) -> StepOutput + Send + Sync>),
    Async(Arc<dyn Fn(State, Vec<State>) -> BoxFuture<'static, StepOutput> + Send + Sync>),
}

/// A configured `init` function, producing the initial state from the
/// positional start arguments.
#[derive(Clone)]
pub(crate) enum InitFn {
    Sync(Arc<dyn Fn(Vec<State>) -> Result<State, ChainError> + Send + Sync>),
    Async(Arc<dyn Fn(Vec<State>) -> BoxFuture<'static, Result<State, ChainError>> + Send + Sync>),
}

/// A configured finalizer, applied exactly once per resolution to the
/// fully-threaded final state.
#[derive(Clone)]
pub(crate) enum FinalizerFn {
    Sync(Arc<dyn Fn(State) -> Result<State, ChainError> + Send + Sync>),
    Async(Arc<dyn Fn(State) -> BoxFuture<'static, Result<State, ChainError>> + Send + Sync>),
}

impl FinalizerFn {
    pub(crate) async fn apply(&self, state: State) -> Result<State, ChainError> {
        match self {
            FinalizerFn::Sync(f) => f(state),
            FinalizerFn::Async(f) => f(state).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name() {
        let name = StepName::new("square");
        assert_eq!(name.as_str(), "square");
        assert_eq!(name.to_string(), "square");

        let from_str: StepName = "square".into();
        assert_eq!(from_str, name);
    }

    #[test]
    fn test_step_name_borrow() {
        use std::collections::HashMap;

        let mut map: HashMap<StepName, i32> = HashMap::new();
        map.insert(StepName::new("a"), 1);
        // Borrow<str> lets lookups use plain string slices
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn test_step_name_serialize() {
        let json = serde_json::to_string(&StepName::new("square")).expect("serializable");
        assert_eq!(json, r#""square""#);
    }

    #[tokio::test]
    async fn test_finalizer_apply() {
        let sync = FinalizerFn::Sync(Arc::new(|state| Ok(state)));
        assert_eq!(sync.apply(State::Int(1)).await, Ok(State::Int(1)));

        let asynchronous = FinalizerFn::Async(Arc::new(|state| {
            Box::pin(async move {
                match state {
                    State::Int(n) => Ok(State::Int(n + 1)),
                    other => Ok(other),
                }
            })
        }));
        assert_eq!(asynchronous.apply(State::Int(1)).await, Ok(State::Int(2)));
    }
}
