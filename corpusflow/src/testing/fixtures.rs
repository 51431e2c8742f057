//! Test corpora and pipeline definitions.

use crate::config::CorpusflowConfig;
use crate::phrases::PHRASE_STEP_NAME;
use crate::pipeline::{PipelineDefinition, StepDescriptor};
use crate::queue::InMemoryTaskQueue;
use crate::service::Corpusflow;
use crate::sources::InMemoryDataSource;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use super::RecordingQueue;

/// Column the fixtures put their text in.
pub const TEXT_COLUMN: &str = "text";

/// Word pairs that [`collocation_corpus`] repeats often enough to be
/// detected at level 2 with [`phrase_pipeline`]'s settings.
pub const COLLOCATIONS: &[(&str, &str)] =
    &[("new", "york"), ("machine", "learning"), ("york", "city")];

/// Returns `3 * repeat` documents in which `new york`, `machine learning`
/// and `new york city` recur while every other word occurs once.
///
/// With `repeat >= 10`, [`phrase_pipeline`] at level 2 joins `new_york`
/// and `machine_learning`; at level 3 it also joins `new_york_city`.
#[must_use]
pub fn collocation_corpus(repeat: usize) -> Vec<String> {
    (0..repeat)
        .flat_map(|i| {
            [
                format!("w{i}a new york w{i}b"),
                format!("w{i}c machine learning w{i}d"),
                format!("new york city w{i}e"),
            ]
        })
        .collect()
}

/// Builds an in-memory data source whose artifacts live in
/// `storage_root/<id>`.
#[must_use]
pub fn memory_source<I, S>(id: &str, storage_root: &Path, texts: I) -> InMemoryDataSource
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    InMemoryDataSource::from_texts(id, storage_root.join(id), TEXT_COLUMN, texts)
}

/// A pipeline with one phrase step at `level` over `data_source_id`.
///
/// Every setting is spelled out in canonical form, so
/// [`fingerprint`](crate::fingerprint::fingerprint) over the raw steps
/// matches what the step computes.
#[must_use]
pub fn phrase_pipeline(data_source_id: &str, level: u32) -> PipelineDefinition {
    PipelineDefinition::new(data_source_id, TEXT_COLUMN).with_step(
        StepDescriptor::new(PHRASE_STEP_NAME, "phrases_1")
            .with_setting("mode", json!("tokenize"))
            .with_setting("level", json!(level))
            .with_setting("min_count", json!(3))
            .with_setting("threshold", json!(1.0))
            .with_setting("scoring", json!("default")),
    )
}

/// Creates a [`Corpusflow`] whose queue records enqueues and runs jobs
/// only when driven through the returned [`InMemoryTaskQueue`].
#[must_use]
pub fn recording_flow(
    config: CorpusflowConfig,
) -> (Corpusflow, InMemoryTaskQueue, Arc<RecordingQueue>) {
    let queue = InMemoryTaskQueue::new(config.queue_name.clone());
    let recorder = Arc::new(RecordingQueue::new(Arc::new(queue.clone())));
    let flow = Corpusflow::new(config, recorder.clone());
    queue.register_task(flow.build_phrases_task());
    (flow, queue, recorder)
}
