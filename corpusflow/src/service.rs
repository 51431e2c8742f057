//! Wiring of engine, cache, dispatcher and the built-in steps.

use crate::cache::{ArtifactCache, PHRASE_ARTIFACT_KIND};
use crate::config::CorpusflowConfig;
use crate::core::{ModelStatus, RunMode};
use crate::errors::CorpusflowError;
use crate::fingerprint::Fingerprint;
use crate::phrases::{BuildPhrasesTask, PhraseStep};
use crate::pipeline::{DocumentStream, PipelineDefinition, PipelineEngine};
use crate::queue::{InMemoryTaskQueue, JobDispatcher, Task, TaskQueue};
use crate::sources::DataSource;
use crate::steps::{LimitStep, Step};
use std::sync::Arc;

/// A ready-to-use corpusflow instance.
///
/// Registers the `limit` and `phrases` steps on a fresh engine and injects
/// one [`JobDispatcher`] over the given queue into the phrase step. The
/// host registers data sources and makes [`Corpusflow::build_phrases_task`]
/// available to whatever runs the queue's jobs.
#[derive(Debug, Clone)]
pub struct Corpusflow {
    config: CorpusflowConfig,
    engine: PipelineEngine,
    cache: ArtifactCache,
    dispatcher: Arc<JobDispatcher>,
}

impl Corpusflow {
    /// Creates an instance backed by `queue`.
    #[must_use]
    pub fn new(config: CorpusflowConfig, queue: Arc<dyn TaskQueue>) -> Self {
        let cache = ArtifactCache::new(config.storage_root.clone());
        let dispatcher = Arc::new(
            JobDispatcher::new(queue, cache.clone())
                .with_timeout(config.job_timeout())
                .with_retry(config.enqueue_retry.clone()),
        );

        let engine = PipelineEngine::new();
        engine.steps().register(Arc::new(LimitStep));
        engine.steps().register(Arc::new(
            PhraseStep::new(Arc::clone(&dispatcher)).with_fanout_budget(config.fanout_budget),
        ));

        tracing::debug!(
            storage_root = %config.storage_root.display(),
            queue = %dispatcher.queue().name(),
            "Corpusflow initialized"
        );
        Self {
            config,
            engine,
            cache,
            dispatcher,
        }
    }

    /// Creates an instance with an [`InMemoryTaskQueue`] whose jobs run when
    /// the caller drives the returned queue.
    #[must_use]
    pub fn in_memory(config: CorpusflowConfig) -> (Self, InMemoryTaskQueue) {
        let queue = InMemoryTaskQueue::new(config.queue_name.clone());
        let flow = Self::new(config, Arc::new(queue.clone()));
        queue.register_task(flow.build_phrases_task());
        (flow, queue)
    }

    /// Creates an instance with an [`InMemoryTaskQueue`] that runs jobs on
    /// `handle`, `worker_concurrency` at a time.
    #[must_use]
    pub fn with_runtime(
        config: CorpusflowConfig,
        handle: tokio::runtime::Handle,
    ) -> (Self, InMemoryTaskQueue) {
        let queue = InMemoryTaskQueue::with_runtime(
            config.queue_name.clone(),
            handle,
            config.worker_concurrency,
        );
        let flow = Self::new(config, Arc::new(queue.clone()));
        queue.register_task(flow.build_phrases_task());
        (flow, queue)
    }

    /// Returns the task that computes phrase artifacts in the background.
    #[must_use]
    pub fn build_phrases_task(&self) -> Arc<dyn Task> {
        Arc::new(BuildPhrasesTask::new(
            self.engine.downgrade(),
            self.cache.clone(),
        ))
    }

    /// Registers a data source.
    pub fn register_source(&self, source: Arc<dyn DataSource>) {
        self.engine.sources().register(source);
    }

    /// Registers an additional step.
    pub fn register_step(&self, step: Arc<dyn Step>) {
        self.engine.steps().register(step);
    }

    /// Builds a pipeline's lazy output.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid.
    pub fn build(
        &self,
        definition: &PipelineDefinition,
        mode: RunMode,
    ) -> Result<DocumentStream, CorpusflowError> {
        self.engine.build(definition, mode)
    }

    /// Returns the fingerprint the step `step_id` of `definition` stores
    /// its artifacts under, or `None` if no such step exists.
    #[must_use]
    pub fn fingerprint(&self, definition: &PipelineDefinition, step_id: &str) -> Option<Fingerprint> {
        self.engine.fingerprint_through(definition, step_id)
    }

    /// Reports phrase model availability for a fingerprint received from
    /// a client.
    ///
    /// # Errors
    ///
    /// Returns an error if `fingerprint` is malformed.
    pub fn model_status(&self, fingerprint: &str) -> Result<ModelStatus, CorpusflowError> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        Ok(self.dispatcher.status(&fingerprint, PHRASE_ARTIFACT_KIND))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CorpusflowConfig {
        &self.config
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Returns the artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }
}
