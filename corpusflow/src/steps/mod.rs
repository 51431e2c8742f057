//! The step contract and built-in steps.
//!
//! A step receives the upstream document stream, its environment and its
//! settings, and returns a new lazy stream. Steps are looked up by name in
//! a [`StepRegistry`](crate::pipeline::StepRegistry).

mod limit;

pub use limit::{LimitSettings, LimitStep, LIMIT_STEP_NAME};

use crate::errors::{CorpusflowError, SettingsError};
use crate::pipeline::{DocumentStream, StepEnv, StepSettings};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Trait for pipeline steps.
pub trait Step: Send + Sync + Debug {
    /// Returns the name the step is registered under.
    fn name(&self) -> &str;

    /// Returns a human-readable title.
    fn title(&self) -> &str {
        self.name()
    }

    /// Checks settings before the pipeline starts.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    fn validate(&self, _settings: &StepSettings) -> Result<(), SettingsError> {
        Ok(())
    }

    /// Returns `settings` in the form that identifies the computation.
    ///
    /// Fingerprints hash the result, so settings that differ only in
    /// spelling (an omitted default, `10` for `10.0`) must come out equal.
    /// The default keeps settings as written.
    fn canonical_settings(&self, settings: &StepSettings) -> StepSettings {
        settings.clone()
    }

    /// Wraps `input` in this step's transformation.
    ///
    /// Implementations must stay lazy: no documents may be pulled and no
    /// side effects performed until the returned stream is consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be constructed.
    fn process(
        &self,
        input: DocumentStream,
        env: StepEnv,
        settings: &StepSettings,
    ) -> Result<DocumentStream, CorpusflowError>;
}

/// Deserializes step settings into a typed struct.
///
/// Keys the struct does not declare are ignored.
///
/// # Errors
///
/// Returns a [`SettingsError`] naming the problem.
pub fn parse_settings<T: DeserializeOwned>(settings: &StepSettings) -> Result<T, SettingsError> {
    let object: serde_json::Map<String, serde_json::Value> = settings
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| SettingsError::new(format!("Invalid settings: {e}")))
}

/// Round-trips settings through their typed form, filling in defaults,
/// normalizing number types and dropping undeclared keys.
///
/// Settings that do not parse are returned unchanged; validation reports
/// them.
pub fn canonicalize_settings<T>(settings: &StepSettings) -> StepSettings
where
    T: DeserializeOwned + Serialize,
{
    let typed = match parse_settings::<T>(settings) {
        Ok(typed) => typed,
        Err(_) => return settings.clone(),
    };
    match serde_json::to_value(typed) {
        Ok(serde_json::Value::Object(object)) => object.into_iter().collect(),
        _ => settings.clone(),
    }
}

type StepFn =
    dyn Fn(DocumentStream, &StepEnv, &StepSettings) -> Result<DocumentStream, CorpusflowError>
        + Send
        + Sync;

/// A step defined by a closure.
pub struct FnStep {
    name: String,
    func: Box<StepFn>,
}

impl FnStep {
    /// Creates a new function-based step.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(DocumentStream, &StepEnv, &StepSettings) -> Result<DocumentStream, CorpusflowError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl Debug for FnStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(
        &self,
        input: DocumentStream,
        env: StepEnv,
        settings: &StepSettings,
    ) -> Result<DocumentStream, CorpusflowError> {
        (self.func)(input, &env, settings)
    }
}
