//! Pipeline and step definitions.

use crate::errors::SettingsError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Settings of one step: option name to value, in the order the UI
/// produced them.
pub type StepSettings = IndexMap<String, serde_json::Value>;

/// One configured step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// The registered step name (e.g. `"phrases"`).
    pub name: String,
    /// Identifies this instance among steps of the same name.
    pub step_id: String,
    /// The step's settings.
    #[serde(default)]
    pub settings: StepSettings,
}

impl StepDescriptor {
    /// Creates a step descriptor with empty settings.
    #[must_use]
    pub fn new(name: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_id: step_id.into(),
            settings: StepSettings::new(),
        }
    }

    /// Sets one setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Replaces all settings.
    #[must_use]
    pub fn with_settings(mut self, settings: StepSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A complete pipeline: where the documents come from and what happens to
/// them, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The data source identifier.
    pub data_source_id: String,
    /// The column holding the document text.
    pub column: String,
    /// The ordered steps.
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

impl PipelineDefinition {
    /// Creates a pipeline with no steps.
    #[must_use]
    pub fn new(data_source_id: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            column: column.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: StepDescriptor) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the position of a step instance.
    #[must_use]
    pub fn position_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }

    /// Returns the pipeline cut after the first `len` steps.
    #[must_use]
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            data_source_id: self.data_source_id.clone(),
            column: self.column.clone(),
            steps: self.steps.iter().take(len).cloned().collect(),
        }
    }

    /// Returns the sub-pipeline ending with (and including) `step_id`.
    #[must_use]
    pub fn through(&self, step_id: &str) -> Option<Self> {
        self.position_of(step_id).map(|pos| self.truncated(pos + 1))
    }

    /// Validates the definition's shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source or column is blank, or if two
    /// steps share a `step_id`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.data_source_id.trim().is_empty() {
            return Err(SettingsError::new("Data source id cannot be empty"));
        }
        if self.column.trim().is_empty() {
            return Err(SettingsError::new("Text column cannot be empty"));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                return Err(SettingsError::new(format!(
                    "Step '{}' has an empty step_id",
                    step.name
                )));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(SettingsError::new(format!(
                    "Duplicate step_id '{}'",
                    step.step_id
                ))
                .with_step_id(step.step_id.clone()));
            }
        }
        Ok(())
    }
}
