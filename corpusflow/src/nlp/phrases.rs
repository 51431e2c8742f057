//! Collocation detection.
//!
//! A [`PhraseLearner`] counts word pairs over a stream of sentences and
//! keeps the pairs scoring above a threshold as [`Phrasegram`]s. A
//! [`PhraseModel`] rewrites sentences by joining those pairs into single
//! tokens (`new york` → `new_york`). Running a second model over the output
//! of the first finds trigrams, and so on.

use crate::core::Sentence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{Read, Write};

/// Joins the two halves of a detected phrase.
pub const PHRASE_DELIMITER: &str = "_";

/// How a candidate word pair is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringAlgorithm {
    /// `(count(ab) - min_count) / (count(a) * count(b)) * vocabulary_size`.
    #[default]
    Default,
    /// Normalized pointwise mutual information, in `[-1, 1]`.
    Npmi,
}

/// A detected word pair and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrasegram {
    /// First word.
    pub left: String,
    /// Second word.
    pub right: String,
    /// Score the pair reached.
    pub score: f64,
}

/// Parameters of phrase learning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnerSettings {
    /// Scoring function.
    pub scoring: ScoringAlgorithm,
    /// Words and pairs seen fewer times than this are ignored.
    pub min_count: u64,
    /// Pairs must score strictly above this to become phrases.
    pub threshold: f64,
}

impl Default for LearnerSettings {
    fn default() -> Self {
        Self {
            scoring: ScoringAlgorithm::Default,
            min_count: 5,
            threshold: 10.0,
        }
    }
}

/// Learns a phrase model from sentences.
pub trait PhraseLearner: Send + Sync + Debug {
    /// Consumes `sentences` and returns the learned model.
    fn learn(
        &self,
        sentences: &mut dyn Iterator<Item = Sentence>,
        settings: &LearnerSettings,
    ) -> PhraseModel;
}

/// Counting learner for adjacent word pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollocationLearner;

impl PhraseLearner for CollocationLearner {
    fn learn(
        &self,
        sentences: &mut dyn Iterator<Item = Sentence>,
        settings: &LearnerSettings,
    ) -> PhraseModel {
        let mut words: HashMap<String, u64> = HashMap::new();
        let mut pairs: HashMap<(String, String), u64> = HashMap::new();
        let mut total_words: u64 = 0;

        for sentence in sentences {
            for (i, token) in sentence.iter().enumerate() {
                *words.entry(token.clone()).or_default() += 1;
                total_words += 1;
                if let Some(next) = sentence.get(i + 1) {
                    *pairs.entry((token.clone(), next.clone())).or_default() += 1;
                }
            }
        }

        let vocabulary = (words.len() + pairs.len()) as f64;
        let min_count = settings.min_count;

        let phrasegrams = pairs
            .iter()
            .filter_map(|((left, right), &count_ab)| {
                let count_a = words.get(left).copied().unwrap_or(0);
                let count_b = words.get(right).copied().unwrap_or(0);
                if count_ab < min_count || count_a < min_count || count_b < min_count {
                    return None;
                }
                let score = match settings.scoring {
                    ScoringAlgorithm::Default => {
                        (count_ab - min_count) as f64 / (count_a as f64 * count_b as f64)
                            * vocabulary
                    }
                    ScoringAlgorithm::Npmi => npmi(count_a, count_b, count_ab, total_words),
                };
                (score > settings.threshold).then(|| Phrasegram {
                    left: left.clone(),
                    right: right.clone(),
                    score,
                })
            })
            .collect();

        PhraseModel::new(*settings, phrasegrams)
    }
}

fn npmi(count_a: u64, count_b: u64, count_ab: u64, total: u64) -> f64 {
    let total = total as f64;
    let p_ab = count_ab as f64 / total;
    if p_ab >= 1.0 {
        return 1.0;
    }
    let p_a = count_a as f64 / total;
    let p_b = count_b as f64 / total;
    (p_ab / (p_a * p_b)).ln() / -p_ab.ln()
}

#[derive(Serialize, Deserialize)]
struct PhraseModelFile {
    format: u32,
    delimiter: String,
    settings: LearnerSettings,
    phrasegrams: Vec<Phrasegram>,
}

const MODEL_FORMAT: u32 = 1;

/// A frozen set of phrasegrams that rewrites sentences.
#[derive(Debug, Clone)]
pub struct PhraseModel {
    settings: LearnerSettings,
    phrasegrams: Vec<Phrasegram>,
    index: HashMap<(String, String), usize>,
}

impl PhraseModel {
    /// Creates a model from phrasegrams. Order of the input does not matter.
    #[must_use]
    pub fn new(settings: LearnerSettings, mut phrasegrams: Vec<Phrasegram>) -> Self {
        phrasegrams.sort_by(|a, b| (&a.left, &a.right).cmp(&(&b.left, &b.right)));
        phrasegrams.dedup_by(|a, b| a.left == b.left && a.right == b.right);
        let index = phrasegrams
            .iter()
            .enumerate()
            .map(|(i, p)| ((p.left.clone(), p.right.clone()), i))
            .collect();
        Self {
            settings,
            phrasegrams,
            index,
        }
    }

    /// Returns the settings the model was learned with.
    #[must_use]
    pub const fn settings(&self) -> &LearnerSettings {
        &self.settings
    }

    /// Returns the phrasegrams, sorted.
    #[must_use]
    pub fn phrasegrams(&self) -> &[Phrasegram] {
        &self.phrasegrams
    }

    /// Returns the number of phrasegrams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phrasegrams.len()
    }

    /// Returns true if no phrases were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrasegrams.is_empty()
    }

    /// Returns the score of a pair, if it is a phrase.
    #[must_use]
    pub fn score(&self, left: &str, right: &str) -> Option<f64> {
        self.index
            .get(&(left.to_string(), right.to_string()))
            .map(|&i| self.phrasegrams[i].score)
    }

    /// Rewrites a sentence, joining detected pairs left to right.
    #[must_use]
    pub fn apply(&self, sentence: &[String]) -> Sentence {
        let mut out = Vec::with_capacity(sentence.len());
        let mut i = 0;
        while i < sentence.len() {
            if let Some(next) = sentence.get(i + 1) {
                if self.index.contains_key(&(sentence[i].clone(), next.clone())) {
                    out.push(format!("{}{PHRASE_DELIMITER}{}", sentence[i], next));
                    i += 2;
                    continue;
                }
            }
            out.push(sentence[i].clone());
            i += 1;
        }
        out
    }

    /// Writes the model as JSON. Output is byte-identical for equal models.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save(&self, writer: impl Write) -> Result<(), serde_json::Error> {
        let file = PhraseModelFile {
            format: MODEL_FORMAT,
            delimiter: PHRASE_DELIMITER.to_string(),
            settings: self.settings,
            phrasegrams: self.phrasegrams.clone(),
        };
        serde_json::to_writer(writer, &file)
    }

    /// Reads a model written by [`PhraseModel::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a model of a supported format.
    pub fn load(reader: impl Read) -> Result<Self, serde_json::Error> {
        let file: PhraseModelFile = serde_json::from_reader(reader)?;
        if file.format != MODEL_FORMAT {
            return Err(serde::de::Error::custom(format!(
                "unsupported phrase model format {}",
                file.format
            )));
        }
        Ok(Self::new(file.settings, file.phrasegrams))
    }
}

impl PartialEq for PhraseModel {
    fn eq(&self, other: &Self) -> bool {
        self.settings == other.settings && self.phrasegrams == other.phrasegrams
    }
}
