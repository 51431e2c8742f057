//! Background computation of phrase models.

use crate::cache::{ArtifactCache, PHRASE_ARTIFACT_KIND};
use crate::core::RunMode;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::observability::SpanTimer;
use crate::pipeline::{PipelineDefinition, PipelineEngine, WeakPipelineEngine};
use crate::queue::Task;
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Map, Value};

/// Name jobs use for [`BuildPhrasesTask`].
pub const BUILD_PHRASES_TASK: &str = "build_phrases";

/// Rebuilds a phrase step's sub-pipeline in batch mode and drains it,
/// which computes and caches the artifact.
///
/// Arguments: the sub-pipeline definition (ending with the phrase step) and
/// its fingerprint. Holds the engine weakly since the engine owns the
/// phrase step that owns the queue that owns this task.
#[derive(Debug, Clone)]
pub struct BuildPhrasesTask {
    engine: WeakPipelineEngine,
    cache: ArtifactCache,
}

impl BuildPhrasesTask {
    /// Creates the task.
    #[must_use]
    pub const fn new(engine: WeakPipelineEngine, cache: ArtifactCache) -> Self {
        Self { engine, cache }
    }

    fn parse_args(
        engine: &PipelineEngine,
        args: &[Value],
    ) -> anyhow::Result<(PipelineDefinition, Fingerprint)> {
        let [definition, expected] = args else {
            bail!("expected 2 arguments (definition, fingerprint), got {}", args.len());
        };
        let definition: PipelineDefinition = serde_json::from_value(definition.clone())
            .context("invalid pipeline definition argument")?;
        let expected = expected
            .as_str()
            .ok_or_else(|| anyhow!("fingerprint argument must be a string"))?;
        let expected = Fingerprint::parse(expected)?;

        let canonical = engine.canonical(&definition);
        let actual = fingerprint(&canonical.data_source_id, &canonical.column, &canonical.steps);
        if actual != expected {
            bail!("definition fingerprints to {actual}, job was enqueued for {expected}");
        }
        Ok((definition, expected))
    }
}

impl Task for BuildPhrasesTask {
    fn name(&self) -> &str {
        BUILD_PHRASES_TASK
    }

    fn run(&self, args: &[Value], _kwargs: &Map<String, Value>) -> anyhow::Result<Value> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| anyhow!("pipeline engine has shut down"))?;
        let (definition, fingerprint) = Self::parse_args(&engine, args)?;

        tracing::info!(
            fingerprint = %fingerprint,
            data_source = %definition.data_source_id,
            "Building phrase model in background"
        );
        let timer = SpanTimer::start(format!("build_phrases:{fingerprint}"));

        let mut documents = 0_u64;
        for document in engine.build(&definition, RunMode::Batch)? {
            document?;
            documents += 1;
        }

        let base = engine
            .sources()
            .get(&definition.data_source_id)?
            .base_path()
            .to_path_buf();
        if !self.cache.exists(&base, &fingerprint, PHRASE_ARTIFACT_KIND) {
            bail!("pipeline finished without producing artifact {fingerprint}");
        }
        timer.finish();

        Ok(json!({
            "fingerprint": fingerprint.as_str(),
            "documents": documents,
        }))
    }
}
