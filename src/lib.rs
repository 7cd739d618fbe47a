//! Script Engine: deterministic Prompt → Script generation.
//!
//! Expands a structured story brief into a scene-by-scene script using only
//! the brief's integer seed as entropy. Documents are checked against
//! versioned contracts on the way in and on the way out, and written in a
//! canonical byte form so identical input always yields identical files.

pub mod core;
pub mod schema;

pub use crate::core::canonical::write;
pub use crate::core::contract::validate;
pub use crate::core::generator::generate;
pub use crate::core::pipeline::{PipelineError, ScriptPipeline};
