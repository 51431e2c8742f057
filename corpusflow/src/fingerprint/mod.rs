//! Content-addressed identities for (data source, column, steps).
//!
//! A [`Fingerprint`] is the lowercase hex SHA-224 digest (56 characters) of
//! a canonical JSON rendering of
//!
//! ```text
//! [[data_source_id, column], [step_name, [[key, value], ...]], ...]
//! ```
//!
//! where each step's settings have the bookkeeping keys in
//! [`BOOKKEEPING_KEYS`] removed and are sorted by key. `step_id` is not part
//! of the input: two instances with the same name and settings at the same
//! position are the same computation.
//!
//! The literal value appears in artifact file names and job metadata and is
//! matched across processes, so the algorithm and layout must not change
//! without invalidating every stored artifact.

mod canonical;

pub use canonical::to_canonical_json;

use crate::errors::CorpusflowError;
use crate::pipeline::{PipelineDefinition, StepDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha224};
use std::fmt;

/// Hash algorithm used for fingerprints.
pub const FINGERPRINT_ALGORITHM: &str = "sha224";

/// Length of a fingerprint string in characters.
pub const FINGERPRINT_LEN: usize = 56;

/// Settings keys that record UI layout rather than behavior.
pub const BOOKKEEPING_KEYS: &[&str] = &["schema_position", "schema_type"];

/// A stable identifier for a (sub-)pipeline's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses a fingerprint received from outside the process.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly [`FINGERPRINT_LEN`]
    /// lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self, CorpusflowError> {
        let valid = value.len() == FINGERPRINT_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(CorpusflowError::InvalidFingerprint(value.to_string()))
        }
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CorpusflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Fingerprints a data source, column and ordered list of steps.
#[must_use]
pub fn fingerprint(data_source_id: &str, column: &str, steps: &[StepDescriptor]) -> Fingerprint {
    let mut salt = Vec::with_capacity(steps.len() + 1);
    salt.push(json!([data_source_id, column]));
    salt.extend(steps.iter().map(step_salt));

    let canonical = to_canonical_json(&Value::Array(salt));
    let digest = Sha224::digest(canonical.as_bytes());
    Fingerprint(hex::encode(digest))
}

/// Fingerprints the sub-pipeline of `definition` ending with `step_id`.
///
/// Steps after `step_id` do not contribute. Returns `None` if the step is
/// not part of the definition.
#[must_use]
pub fn fingerprint_through(definition: &PipelineDefinition, step_id: &str) -> Option<Fingerprint> {
    definition.position_of(step_id).map(|pos| {
        fingerprint(
            &definition.data_source_id,
            &definition.column,
            &definition.steps[..=pos],
        )
    })
}

fn step_salt(step: &StepDescriptor) -> Value {
    let mut settings: Vec<(&String, &Value)> = step
        .settings
        .iter()
        .filter(|(key, _)| !BOOKKEEPING_KEYS.contains(&key.as_str()))
        .collect();
    settings.sort_by(|a, b| a.0.cmp(b.0));

    let pairs: Vec<Value> = settings
        .into_iter()
        .map(|(key, value)| json!([key, value]))
        .collect();
    json!([step.name, pairs])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepSettings;
    use pretty_assertions::{assert_eq, assert_ne};

    fn phrases(level: i64, threshold: f64) -> StepDescriptor {
        StepDescriptor::new("phrases", "phrases_1")
            .with_setting("level", json!(level))
            .with_setting("min_count", json!(5))
            .with_setting("threshold", json!(threshold))
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint("A", "text", &[phrases(2, 10.0)]);
        assert_eq!(fp.as_str().len(), FINGERPRINT_LEN);
        assert!(Fingerprint::parse(fp.as_str()).is_ok());
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let steps = [phrases(2, 10.0), StepDescriptor::new("limit", "limit_1")];
        assert_eq!(fingerprint("A", "text", &steps), fingerprint("A", "text", &steps));
    }

    #[test]
    fn test_settings_order_does_not_matter() {
        let mut reversed = StepSettings::new();
        reversed.insert("threshold".into(), json!(10.0));
        reversed.insert("min_count".into(), json!(5));
        reversed.insert("level".into(), json!(2));
        let reordered = StepDescriptor::new("phrases", "phrases_1").with_settings(reversed);

        assert_eq!(
            fingerprint("A", "text", &[phrases(2, 10.0)]),
            fingerprint("A", "text", &[reordered])
        );
    }

    #[test]
    fn test_nested_setting_order_does_not_matter() {
        let a = StepDescriptor::new("x", "x").with_setting("opts", json!({"a": 1, "b": 2}));
        let b = StepDescriptor::new("x", "x").with_setting("opts", json!({"b": 2, "a": 1}));
        assert_eq!(fingerprint("A", "t", &[a]), fingerprint("A", "t", &[b]));
    }

    #[test]
    fn test_any_value_change_changes_fingerprint() {
        let base = fingerprint("A", "text", &[phrases(2, 10.0)]);
        assert_ne!(base, fingerprint("A", "text", &[phrases(3, 10.0)]));
        assert_ne!(base, fingerprint("A", "text", &[phrases(2, 10.5)]));
        assert_ne!(base, fingerprint("B", "text", &[phrases(2, 10.0)]));
        assert_ne!(base, fingerprint("A", "body", &[phrases(2, 10.0)]));
    }

    #[test]
    fn test_bookkeeping_keys_ignored() {
        let plain = phrases(2, 10.0);
        let annotated = phrases(2, 10.0)
            .with_setting("schema_position", json!(4))
            .with_setting("schema_type", json!("phrases"));
        assert_eq!(
            fingerprint("A", "text", &[plain]),
            fingerprint("A", "text", &[annotated])
        );
    }

    #[test]
    fn test_step_id_ignored() {
        let mut renamed = phrases(2, 10.0);
        renamed.step_id = "phrases_9".into();
        assert_eq!(
            fingerprint("A", "text", &[phrases(2, 10.0)]),
            fingerprint("A", "text", &[renamed])
        );
    }

    #[test]
    fn test_step_order_matters() {
        let limit = StepDescriptor::new("limit", "limit_1").with_setting("max_count", json!(3));
        assert_ne!(
            fingerprint("A", "text", &[limit.clone(), phrases(2, 10.0)]),
            fingerprint("A", "text", &[phrases(2, 10.0), limit])
        );
    }

    #[test]
    fn test_trailing_steps_ignored() {
        let short = PipelineDefinition::new("A", "text")
            .with_step(StepDescriptor::new("limit", "limit_1"))
            .with_step(phrases(2, 10.0));
        let long = short
            .clone()
            .with_step(StepDescriptor::new("limit", "limit_2").with_setting("max_count", json!(1)))
            .with_step(StepDescriptor::new("phrases", "phrases_2"));

        let a = fingerprint_through(&short, "phrases_1").unwrap();
        let b = fingerprint_through(&long, "phrases_1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, fingerprint_through(&long, "phrases_2").unwrap());
        assert!(fingerprint_through(&short, "nope").is_none());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Fingerprint::parse("").is_err());
        assert!(Fingerprint::parse("../../etc/passwd").is_err());
        assert!(Fingerprint::parse(&"A".repeat(FINGERPRINT_LEN)).is_err());
        assert!(Fingerprint::parse(&"a".repeat(FINGERPRINT_LEN + 1)).is_err());
        assert!(Fingerprint::parse(&"a".repeat(FINGERPRINT_LEN)).is_ok());
    }

    #[test]
    fn test_serde_validates() {
        let fp = fingerprint("A", "text", &[]);
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
        assert!(serde_json::from_str::<Fingerprint>("\"zz\"").is_err());
    }
}
