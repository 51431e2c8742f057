//! Settings of the phrase step.

use crate::core::Sentence;
use crate::errors::SettingsError;
use crate::nlp::{LearnerSettings, ScoringAlgorithm, PHRASE_DELIMITER};
use serde::{Deserialize, Serialize};

/// What the phrase step emits for each document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseMode {
    /// The text with detected phrases joined into single tokens.
    #[default]
    Tokenize,
    /// The plain tokens followed by the detected phrases.
    Append,
    /// Only the detected phrases.
    Replace,
}

impl PhraseMode {
    /// Renders a document as text from its tokens before and after phrase
    /// detection. `original` and `phrased` hold the same sentences.
    ///
    /// A phrase is a token that stands for two or more consecutive
    /// original tokens, so words that already contain the delimiter are
    /// never mistaken for phrases.
    #[must_use]
    pub fn render(self, original: &[Sentence], phrased: &[Sentence]) -> String {
        let phrases = || {
            original
                .iter()
                .zip(phrased)
                .flat_map(|(original, phrased)| phrase_tokens(original, phrased))
        };
        match self {
            Self::Tokenize => crate::core::join_sentences(phrased),
            Self::Append => {
                let mut text = crate::core::join_sentences(original);
                for phrase in phrases() {
                    text.push(' ');
                    text.push_str(phrase);
                }
                text
            }
            Self::Replace => phrases().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Returns the tokens of `phrased` that join several tokens of `original`.
fn phrase_tokens<'a>(original: &[String], phrased: &'a [String]) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut next = 0;
    for token in phrased {
        if original.get(next) == Some(token) {
            next += 1;
            continue;
        }
        let start = next;
        let mut joined = String::new();
        while next < original.len() && joined.len() < token.len() {
            if next > start {
                joined.push_str(PHRASE_DELIMITER);
            }
            joined.push_str(&original[next]);
            next += 1;
        }
        if next - start > 1 && joined == *token {
            found.push(token.as_str());
        }
    }
    found
}

const fn default_level() -> u32 {
    2
}

const fn default_min_count() -> u64 {
    5
}

const fn default_threshold() -> f64 {
    10.0
}

/// Settings of [`PhraseStep`](super::PhraseStep).
///
/// Unknown keys, including the UI's `schema_position` and `schema_type`,
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhraseSettings {
    /// Output rendering.
    #[serde(default)]
    pub mode: PhraseMode,
    /// Longest phrase in words: 2 (bigrams), 3 (trigrams) or 4 (quadgrams).
    /// `level - 1` models are learned.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Words and pairs rarer than this never form phrases.
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    /// Score a pair must exceed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Scoring function.
    #[serde(default)]
    pub scoring: ScoringAlgorithm,
}

impl Default for PhraseSettings {
    fn default() -> Self {
        Self {
            mode: PhraseMode::default(),
            level: default_level(),
            min_count: default_min_count(),
            threshold: default_threshold(),
            scoring: ScoringAlgorithm::default(),
        }
    }
}

impl PhraseSettings {
    /// Number of model levels learned.
    #[must_use]
    pub const fn passes(&self) -> u32 {
        self.level.saturating_sub(1)
    }

    /// Settings handed to the learner for every level.
    #[must_use]
    pub const fn learner_settings(&self) -> LearnerSettings {
        LearnerSettings {
            scoring: self.scoring,
            min_count: self.min_count,
            threshold: self.threshold,
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] naming the first invalid key.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(2..=4).contains(&self.level) {
            return Err(
                SettingsError::new(format!("level must be 2, 3 or 4, got {}", self.level))
                    .with_key("level"),
            );
        }
        if self.min_count == 0 {
            return Err(SettingsError::new("min_count must be at least 1").with_key("min_count"));
        }
        if !self.threshold.is_finite() {
            return Err(SettingsError::new("threshold must be a finite number").with_key("threshold"));
        }
        if self.scoring == ScoringAlgorithm::Npmi && !(-1.0..=1.0).contains(&self.threshold) {
            return Err(SettingsError::new(format!(
                "threshold must be between -1 and 1 for npmi scoring, got {}",
                self.threshold
            ))
            .with_key("threshold"));
        }
        Ok(())
    }
}
