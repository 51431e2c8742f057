//! # Corpusflow
//!
//! Lazy text-processing pipelines over document corpora, with corpus-wide
//! models computed in the background and cached by content fingerprint.
//!
//! Corpusflow provides:
//!
//! - **Lazy pipelines**: ordered, independently configured steps composed
//!   into one pull-driven document stream
//! - **Fingerprints**: stable identifiers for a data source, column and the
//!   steps up to a given point
//! - **Artifact cache**: leveled model files on disk, written atomically and
//!   marked complete
//! - **Background jobs**: at most one job per fingerprint, with status
//!   lookup, over any task queue
//! - **Phrase detection**: a step that previews instantly and computes
//!   collocation models inline in batch mode
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corpusflow::prelude::*;
//!
//! let (flow, queue) = Corpusflow::in_memory(CorpusflowConfig::default());
//! flow.register_source(Arc::new(JsonLinesDataSource::new(
//!     "reviews",
//!     "data/reviews",
//!     "data/reviews.jsonl",
//! )));
//!
//! let definition = PipelineDefinition::new("reviews", "text").with_step(
//!     StepDescriptor::new("phrases", "phrases_1").with_setting("level", json!(3)),
//! );
//!
//! // Returns tokenized text at once and queues the model computation.
//! for document in flow.build(&definition, RunMode::Preview)? {
//!     println!("{}", document?.to_text());
//! }
//! queue.run_pending();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod fingerprint;
pub mod nlp;
pub mod observability;
pub mod phrases;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod sources;
pub mod steps;
pub mod testing;
pub mod utils;


pub use config::CorpusflowConfig;
pub use service::Corpusflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{ArtifactCache, LeveledModel, PHRASE_ARTIFACT_KIND};
    pub use crate::config::CorpusflowConfig;
    pub use crate::core::{Content, Document, JobStatus, ModelStatus, RunMode, Sentence};
    pub use crate::errors::{ArtifactError, CorpusflowError, QueueError, SettingsError};
    pub use crate::fingerprint::{fingerprint, Fingerprint};
    pub use crate::observability::{init_logging, LogConfig};
    pub use crate::phrases::{PhraseMode, PhraseSettings, PhraseStep};
    pub use crate::pipeline::{
        DocumentStream, PipelineDefinition, PipelineEngine, StepDescriptor, StepEnv,
        StepSettings,
    };
    pub use crate::queue::{
        EnqueueOutcome, InMemoryTaskQueue, JobDispatcher, JobRecord, Task, TaskQueue,
    };
    pub use crate::service::Corpusflow;
    pub use crate::sources::{DataSource, InMemoryDataSource, JsonLinesDataSource};
    pub use crate::steps::Step;
    pub use crate::utils::{iso_timestamp, Timestamp};
}
