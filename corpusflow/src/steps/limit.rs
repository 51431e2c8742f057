//! Row-limit step.

use super::{canonicalize_settings, parse_settings, Step};
use crate::errors::{CorpusflowError, SettingsError};
use crate::pipeline::{DocumentStream, StepEnv, StepSettings};
use serde::{Deserialize, Serialize};

/// Registered name of the limit step.
pub const LIMIT_STEP_NAME: &str = "limit";

/// Settings for [`LimitStep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Maximum number of documents to pass; 0 means unlimited.
    #[serde(default)]
    pub max_count: usize,
}

/// Passes at most `max_count` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitStep;

impl Step for LimitStep {
    fn name(&self) -> &str {
        LIMIT_STEP_NAME
    }

    fn title(&self) -> &str {
        "Limit number of results"
    }

    fn validate(&self, settings: &StepSettings) -> Result<(), SettingsError> {
        parse_settings::<LimitSettings>(settings).map(|_| ())
    }

    fn canonical_settings(&self, settings: &StepSettings) -> StepSettings {
        canonicalize_settings::<LimitSettings>(settings)
    }

    fn process(
        &self,
        input: DocumentStream,
        _env: StepEnv,
        settings: &StepSettings,
    ) -> Result<DocumentStream, CorpusflowError> {
        let settings: LimitSettings = parse_settings(settings)?;
        if settings.max_count == 0 {
            return Ok(input);
        }
        Ok(Box::new(input.take(settings.max_count)))
    }
}
