//! Core types shared by every pipeline step.

mod document;
mod status;

pub use document::{join_sentences, Content, Document, Sentence};
pub use status::{JobStatus, ModelStatus, RunMode};
