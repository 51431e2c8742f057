//! What a step knows about the pipeline it runs in.

use super::{DocumentStream, PipelineDefinition, PipelineEngine, StepDescriptor};
use crate::core::RunMode;
use crate::errors::CorpusflowError;
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::sources::DataSource;
use std::path::PathBuf;
use std::sync::Arc;

/// The environment handed to [`Step::process`](crate::steps::Step::process).
///
/// Gives a step its position in the pipeline so it can fingerprint its own
/// sub-pipeline, and a handle to the engine so it can rebuild the steps
/// before it (in either mode).
#[derive(Clone)]
pub struct StepEnv {
    engine: PipelineEngine,
    definition: Arc<PipelineDefinition>,
    position: usize,
    mode: RunMode,
}

impl StepEnv {
    pub(crate) fn new(
        engine: PipelineEngine,
        definition: Arc<PipelineDefinition>,
        position: usize,
        mode: RunMode,
    ) -> Self {
        debug_assert!(position < definition.steps.len());
        Self {
            engine,
            definition,
            position,
            mode,
        }
    }

    /// Returns the data source id.
    #[must_use]
    pub fn data_source_id(&self) -> &str {
        &self.definition.data_source_id
    }

    /// Returns the text column.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.definition.column
    }

    /// Returns the evaluation mode.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the descriptor of the step being processed.
    #[must_use]
    pub fn step(&self) -> &StepDescriptor {
        &self.definition.steps[self.position]
    }

    /// Returns the steps before this one.
    #[must_use]
    pub fn upstream_steps(&self) -> &[StepDescriptor] {
        &self.definition.steps[..self.position]
    }

    /// Returns the pipeline up to and including this step.
    #[must_use]
    pub fn sub_pipeline(&self) -> PipelineDefinition {
        self.definition.truncated(self.position + 1)
    }

    /// Fingerprints the pipeline up to and including this step.
    #[must_use]
    ///
    /// Settings are canonicalized by their steps first, see
    /// [`PipelineEngine::canonical`].
    pub fn fingerprint(&self) -> Fingerprint {
        let canonical = self.engine.canonical(&self.sub_pipeline());
        fingerprint(self.data_source_id(), self.column(), &canonical.steps)
    }

    /// Returns the engine that built this pipeline.
    #[must_use]
    pub const fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    /// Resolves the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source is not registered.
    pub fn data_source(&self) -> Result<Arc<dyn DataSource>, CorpusflowError> {
        self.engine.sources().get(self.data_source_id())
    }

    /// Returns the storage directory for artifacts of this data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source is not registered.
    pub fn base_path(&self) -> Result<PathBuf, CorpusflowError> {
        Ok(self.data_source()?.base_path().to_path_buf())
    }

    /// Builds a fresh stream of this step's input by re-running the
    /// upstream steps from the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream pipeline fails validation.
    pub fn replay_upstream(&self, mode: RunMode) -> Result<DocumentStream, CorpusflowError> {
        self.engine
            .build(&self.definition.truncated(self.position), mode)
    }
}

impl std::fmt::Debug for StepEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEnv")
            .field("data_source_id", &self.data_source_id())
            .field("column", &self.column())
            .field("step_id", &self.step().step_id)
            .field("position", &self.position)
            .field("mode", &self.mode)
            .finish()
    }
}
