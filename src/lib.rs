//! # Kusari (鎖)
//!
//! A lazy, chainable step pipeline combinator for Rust.
//!
//! The name "Kusari" (鎖) means "chain" in Japanese: a declarative map of
//! named step functions becomes a fluent, lazily-evaluated chain. Calling a
//! step queues a transformation of the threaded state and returns a new
//! chain; nothing executes until the chain is awaited or resolved.
//!
//! ## Features
//!
//! - **Lazy**: chaining records intent; step bodies run only at resolution,
//!   strictly in call order, at most once per call site
//! - **Sync/Async transparent**: synchronous and asynchronous steps mix
//!   freely; callers never need to know which a step is
//! - **Immutable chains**: every step or flag access yields a brand-new
//!   chain snapshot, so chains branch without interference
//! - **Flags**: declared names whose reads tally counts and an ordered log
//!   inside the state, via layered record derivation
//! - **Executor-agnostic**: built on plain `futures`; bring any runtime
//! - **Error Handling**: structured errors with `thiserror`, one rejection
//!   channel for step, init, and finalizer failures
//!
//! ## Quick Start
//!
//! ```rust
//! use kusari::{Pipeline, State};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), kusari::ChainError> {
//! let pipeline = Pipeline::builder()
//!     .step("square", |state, _args| match state {
//!         State::Int(n) => Ok(Some(State::Int(n * n))),
//!         other => Ok(Some(other)),
//!     })
//!     .step("cube", |state, _args| match state {
//!         State::Int(n) => Ok(Some(State::Int(n * n * n))),
//!         other => Ok(Some(other)),
//!     })
//!     .step("negate", |state, _args| match state {
//!         State::Int(n) => Ok(Some(State::Int(-n))),
//!         other => Ok(Some(other)),
//!     })
//!     .build()?;
//!
//! let result = pipeline
//!     .start([State::from(2)])
//!     .step("square", [])?
//!     .step("cube", [])?
//!     .step("negate", [])?
//!     .await?;
//! assert_eq!(result, State::Int(-64));
//! # Ok(())
//! # }
//! ```
//!
//! ## Init and Finalizer
//!
//! `init` builds the initial state from the start arguments; the finalizer
//! is applied exactly once per resolution to the fully-threaded final
//! state:
//!
//! ```rust
//! use kusari::{ChainError, Pipeline, Record, State};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChainError> {
//! let pipeline = Pipeline::builder()
//!     .init(|mut args| {
//!         let name = match args.pop() {
//!             Some(State::Text(name)) => name,
//!             _ => return Err(ChainError::step("init", "expected a name")),
//!         };
//!         Ok(State::Record(Record::from_fields([
//!             ("name", State::Text(name)),
//!             ("has_banana", State::Bool(false)),
//!         ])))
//!     })
//!     .step("with_banana", |state, _args| match state {
//!         State::Record(record) => Ok(Some(State::Record(
//!             record.with("has_banana", State::Bool(true)),
//!         ))),
//!         other => Ok(Some(other)),
//!     })
//!     .finalize(|state| {
//!         let record = match &state {
//!             State::Record(record) => record,
//!             _ => return Ok(state),
//!         };
//!         let name = match record.get("name") {
//!             Some(State::Text(name)) => name.clone(),
//!             _ => String::new(),
//!         };
//!         let suffix = match record.get("has_banana") {
//!             Some(State::Bool(true)) => " with banana",
//!             _ => "",
//!         };
//!         Ok(State::Text(format!("{name}{suffix}")))
//!     })
//!     .build()?;
//!
//! let monkey = pipeline
//!     .start([State::from("monkey")])
//!     .step("with_banana", [])?
//!     .await?;
//! assert_eq!(monkey, State::from("monkey with banana"));
//!
//! // A sibling chain from the same pipeline is unaffected.
//! let bird = pipeline.start([State::from("bird")]).await?;
//! assert_eq!(bird, State::from("bird"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Flags
//!
//! ```rust
//! use kusari::{Pipeline, State};
//!
//! # fn main() -> Result<(), kusari::ChainError> {
//! let pipeline = Pipeline::builder().flags(["verbose", "dry_run"]).build()?;
//!
//! let chain = pipeline
//!     .start([])
//!     .flag("verbose")?
//!     .flag("dry_run")?
//!     .flag("verbose")?;
//!
//! // Flag reads are synchronous, so the escape hatch applies: no awaiting.
//! let state = chain.try_value().expect("synchronous chain")?;
//! if let State::Record(record) = state {
//!     assert_eq!(record.get("verbose"), Some(&State::Int(2)));
//!     assert_eq!(record.get("dry_run"), Some(&State::Int(1)));
//!     assert_eq!(
//!         record.get("flags"),
//!         Some(&State::List(vec![
//!             State::from("verbose"),
//!             State::from("dry_run"),
//!             State::from("verbose"),
//!         ]))
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Step, `init`, and finalizer failures all surface through the single
//! rejection channel and short-circuit every step queued afterwards:
//!
//! ```rust
//! use kusari::{ChainError, Pipeline, State};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChainError> {
//! let pipeline = Pipeline::builder()
//!     .step("explode", |_state, _args| Err(ChainError::step("explode", "boom")))
//!     .step("after", |state, _args| Ok(Some(state)))
//!     .build()?;
//!
//! let result = pipeline
//!     .start([State::from(1)])
//!     .step("explode", [])?
//!     .step("after", [])?
//!     .await;
//! assert_eq!(result, Err(ChainError::step("explode", "boom")));
//! # Ok(())
//! # }
//! ```

mod chain;
mod deferred;
mod error;
mod pipeline;
mod state;
mod step;

pub mod prelude;

pub use chain::Chain;
pub use error::ChainError;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use state::{Record, State};
pub use step::{StepName, StepOutput};
