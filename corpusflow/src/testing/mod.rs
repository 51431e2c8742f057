//! Testing utilities for corpusflow hosts.
//!
//! This module provides:
//! - Small corpora with known collocations
//! - Task queues that are unreachable or that record what they receive

mod fixtures;
mod queues;

pub use fixtures::{
    collocation_corpus, memory_source, phrase_pipeline, recording_flow, COLLOCATIONS, TEXT_COLUMN,
};
pub use queues::{RecordingQueue, UnreachableQueue};
