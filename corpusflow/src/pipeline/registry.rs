//! Registry of step implementations by name.

use crate::errors::CorpusflowError;
use crate::steps::Step;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps step names to implementations.
#[derive(Default)]
pub struct StepRegistry {
    steps: RwLock<HashMap<String, Arc<dyn Step>>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step under its own name, replacing any previous one.
    pub fn register(&self, step: Arc<dyn Step>) {
        let name = step.name().to_string();
        if self.steps.write().insert(name.clone(), step).is_some() {
            tracing::warn!(step = %name, "Replaced registered step");
        }
    }

    /// Looks up a step.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusflowError::UnknownStep`] if the name is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Step>, CorpusflowError> {
        self.steps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CorpusflowError::UnknownStep(name.to_string()))
    }

    /// Returns true if a step is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.steps.read().contains_key(name)
    }

    /// Lists registered step names with their titles, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<(String, String)> {
        let mut steps: Vec<_> = self
            .steps
            .read()
            .values()
            .map(|s| (s.name().to_string(), s.title().to_string()))
            .collect();
        steps.sort();
        steps
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::LimitStep;

    #[test]
    fn test_register_and_get() {
        let registry = StepRegistry::new();
        registry.register(Arc::new(LimitStep));

        assert!(registry.contains("limit"));
        assert_eq!(registry.get("limit").unwrap().name(), "limit");
        assert_eq!(
            registry.list(),
            vec![("limit".to_string(), "Limit number of results".to_string())]
        );
    }

    #[test]
    fn test_unknown_step() {
        let registry = StepRegistry::new();
        assert!(matches!(
            registry.get("phrases"),
            Err(CorpusflowError::UnknownStep(name)) if name == "phrases"
        ));
    }
}
