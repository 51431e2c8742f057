//! Pipeline definition, composition and lazy evaluation.
//!
//! This module provides:
//! - Pipeline and step definitions
//! - The step registry
//! - The engine that composes steps over a data source
//! - Stream primitives (deferred construction, bounded fan-out)

mod engine;
mod env;
mod registry;
mod spec;
mod stream;

pub use engine::{PipelineEngine, WeakPipelineEngine};
pub use env::StepEnv;
pub use registry::StepRegistry;
pub use spec::{PipelineDefinition, StepDescriptor, StepSettings};
pub use stream::{
    deferred, empty, from_documents, tee, DocumentResult, DocumentStream, TeeBranch,
};
