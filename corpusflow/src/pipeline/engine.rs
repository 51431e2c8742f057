//! The pipeline engine.

use super::{DocumentStream, PipelineDefinition, StepDescriptor, StepEnv, StepRegistry};
use crate::core::RunMode;
use crate::errors::CorpusflowError;
use crate::fingerprint::{fingerprint_through, Fingerprint};
use crate::sources::DataSourceRegistry;
use crate::steps::Step;
use std::sync::{Arc, Weak};

struct EngineInner {
    steps: StepRegistry,
    sources: DataSourceRegistry,
}

/// Composes registered steps over a data source into one lazy stream.
///
/// Cheap to clone; clones share the same registries.
#[derive(Clone)]
pub struct PipelineEngine {
    inner: Arc<EngineInner>,
}

/// A non-owning handle to a [`PipelineEngine`].
///
/// Background tasks hold this instead of the engine itself, since the
/// engine (through its steps) owns the queue those tasks are registered on.
#[derive(Clone, Default)]
pub struct WeakPipelineEngine {
    inner: Weak<EngineInner>,
}

impl WeakPipelineEngine {
    /// Returns the engine if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<PipelineEngine> {
        self.inner.upgrade().map(|inner| PipelineEngine { inner })
    }
}

impl std::fmt::Debug for WeakPipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakPipelineEngine")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineEngine {
    /// Creates an engine with empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                steps: StepRegistry::new(),
                sources: DataSourceRegistry::new(),
            }),
        }
    }

    /// Returns the step registry.
    #[must_use]
    pub fn steps(&self) -> &StepRegistry {
        &self.inner.steps
    }

    /// Returns the data source registry.
    #[must_use]
    pub fn sources(&self) -> &DataSourceRegistry {
        &self.inner.sources
    }

    /// Returns a weak handle to this engine.
    #[must_use]
    pub fn downgrade(&self) -> WeakPipelineEngine {
        WeakPipelineEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Resolves every step of `definition` and validates its settings.
    ///
    /// # Errors
    ///
    /// Returns the first shape, lookup or settings error.
    pub fn validate(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<Vec<Arc<dyn Step>>, CorpusflowError> {
        definition.validate()?;
        self.sources().get(&definition.data_source_id)?;

        definition
            .steps
            .iter()
            .map(|descriptor| {
                let step = self.steps().get(&descriptor.name)?;
                step.validate(&descriptor.settings)
                    .map_err(|e| e.with_step_id(descriptor.step_id.clone()))?;
                Ok(step)
            })
            .collect()
    }

    /// Builds the lazy output stream of a pipeline.
    ///
    /// All steps are validated before any is composed, so a malformed
    /// definition never starts. No document is read until the returned
    /// stream is pulled.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a step cannot be composed.
    pub fn build(
        &self,
        definition: &PipelineDefinition,
        mode: RunMode,
    ) -> Result<DocumentStream, CorpusflowError> {
        let resolved = self.validate(definition)?;
        let source = self.sources().get(&definition.data_source_id)?;

        tracing::debug!(
            data_source = %definition.data_source_id,
            column = %definition.column,
            steps = definition.steps.len(),
            %mode,
            "Building pipeline"
        );

        let definition = Arc::new(definition.clone());
        let mut stream = source.documents(&definition.column)?;
        for (position, step) in resolved.into_iter().enumerate() {
            let env = StepEnv::new(self.clone(), Arc::clone(&definition), position, mode);
            let settings = &definition.steps[position].settings;
            stream = step.process(stream, env, settings)?;
        }
        Ok(stream)
    }

    /// Builds a pipeline from its parts.
    ///
    /// # Errors
    ///
    /// See [`PipelineEngine::build`].
    pub fn build_from_parts(
        &self,
        data_source_id: &str,
        column: &str,
        steps: &[StepDescriptor],
        mode: RunMode,
    ) -> Result<DocumentStream, CorpusflowError> {
        let definition = PipelineDefinition {
            data_source_id: data_source_id.to_string(),
            column: column.to_string(),
            steps: steps.to_vec(),
        };
        self.build(&definition, mode)
    }

    /// Returns `definition` with every registered step's settings in
    /// canonical form. Steps that are not registered keep their settings.
    #[must_use]
    pub fn canonical(&self, definition: &PipelineDefinition) -> PipelineDefinition {
        let steps = definition
            .steps
            .iter()
            .map(|descriptor| match self.steps().get(&descriptor.name) {
                Ok(step) => StepDescriptor {
                    settings: step.canonical_settings(&descriptor.settings),
                    ..descriptor.clone()
                },
                Err(_) => descriptor.clone(),
            })
            .collect();
        PipelineDefinition {
            data_source_id: definition.data_source_id.clone(),
            column: definition.column.clone(),
            steps,
        }
    }

    /// Fingerprints the canonical sub-pipeline of `definition` ending with
    /// `step_id`. This is the fingerprint the step itself computes its
    /// artifacts under.
    #[must_use]
    pub fn fingerprint_through(&self, definition: &PipelineDefinition, step_id: &str) -> Option<Fingerprint> {
        fingerprint_through(&self.canonical(definition), step_id)
    }

    /// Creates the environment a step at `position` would see.
    ///
    /// # Errors
    ///
    /// Returns an error if `position` is out of range.
    pub fn env_for(
        &self,
        definition: &PipelineDefinition,
        position: usize,
        mode: RunMode,
    ) -> Result<StepEnv, CorpusflowError> {
        if position >= definition.steps.len() {
            return Err(crate::errors::SettingsError::new(format!(
                "Step position {position} out of range"
            ))
            .into());
        }
        Ok(StepEnv::new(
            self.clone(),
            Arc::new(definition.clone()),
            position,
            mode,
        ))
    }
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("steps", &self.inner.steps)
            .field("sources", &self.inner.sources)
            .finish()
    }
}
