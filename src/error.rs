use crate::step::StepName;
use thiserror::Error;

/// Errors that can occur while building or resolving a chain.
///
/// This enum represents all possible error conditions: failures raised by
/// user step functions, lookups of undeclared steps or flags, flag reads
/// over states that cannot carry a tally, and invalid pipeline
/// configurations.
///
/// All failure sources (step bodies, `init`, the finalizer) surface through
/// the same rejection channel: the `Err` arm of chain resolution. A rejected
/// chain short-circuits every step queued after the failing one.
///
/// # Clone
///
/// Chain results are memoized and shared between clones of a chain, so the
/// error type must be cloneable.
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code. When matching
/// on this error, always include a wildcard pattern:
///
/// ```
/// use kusari::{ChainError, StepName};
///
/// fn handle_error(error: ChainError) {
///     match error {
///         ChainError::Step { step_name, details } => {
///             eprintln!("Step {} failed: {}", step_name, details);
///         }
///         ChainError::StepNotFound(name) => {
///             eprintln!("Step {} is not declared", name);
///         }
///         ChainError::Configuration(msg) => {
///             eprintln!("Configuration error: {}", msg);
///         }
///         _ => eprintln!("Error: {}", error),
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainError {
    /// A step function failed.
    ///
    /// Raised by user step bodies (or `init`/finalizer functions) and
    /// propagated unchanged through the rejection channel.
    #[error("step '{step_name}' failed: {details}")]
    Step {
        /// The name of the step that failed
        step_name: StepName,
        /// Details about the failure
        details: String,
    },

    /// A step name was invoked that the pipeline does not declare.
    #[error("step not found: {0}")]
    StepNotFound(StepName),

    /// A flag name was read that the pipeline does not declare.
    #[error("flag not found: {0}")]
    FlagNotFound(StepName),

    /// A flag was read while the threaded state was not a record.
    ///
    /// Flag tallies live inside the state as derived record fields, so
    /// there is nowhere to store them when the state is a primitive or a
    /// list. The rejection surfaces at resolution time, like any other
    /// step failure.
    #[error("flag '{flag}' requires a record state, found {found}")]
    FlagTarget {
        /// The flag that was read
        flag: StepName,
        /// The kind of state the chain carried at that point
        found: &'static str,
    },

    /// The pipeline configuration is invalid.
    ///
    /// Returned by the builder for duplicate step names, duplicate flags,
    /// step/flag collisions, and reserved names used as steps or flags.
    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),
}

impl ChainError {
    /// Convenience constructor for step-body failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use kusari::ChainError;
    ///
    /// let error = ChainError::step("parse", "input is not a number");
    /// assert_eq!(
    ///     error.to_string(),
    ///     "step 'parse' failed: input is not a number"
    /// );
    /// ```
    pub fn step(step_name: impl Into<StepName>, details: impl Into<String>) -> Self {
        ChainError::Step {
            step_name: step_name.into(),
            details: details.into(),
        }
    }
}
