//! Text primitives: tokenization and collocation (phrase) models.

mod phrases;
mod tokenizer;

pub use phrases::{
    CollocationLearner, LearnerSettings, PhraseLearner, PhraseModel, Phrasegram, ScoringAlgorithm,
    PHRASE_DELIMITER,
};
pub use tokenizer::{RegexTokenizer, Tokenizer};
