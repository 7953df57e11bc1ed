//! Commonly used types

pub use crate::chain::Chain;
pub use crate::error::ChainError;
pub use crate::pipeline::{Pipeline, PipelineBuilder};
pub use crate::state::{Record, State};
pub use crate::step::StepName;
