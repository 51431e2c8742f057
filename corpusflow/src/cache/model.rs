//! Models stored as leveled artifacts.

use crate::core::Sentence;
use crate::nlp::PhraseModel;
use std::io::{self, Read, Write};

/// A model that can be persisted as one level of an artifact and applied
/// to tokenized sentences.
pub trait LeveledModel: Sized + Send + Sync + 'static {
    /// Rewrites one sentence.
    fn apply(&self, sentence: &[String]) -> Sentence;

    /// Serializes the model.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(&self, writer: &mut dyn Write) -> io::Result<()>;

    /// Deserializes a model.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a valid model.
    fn read_from(reader: &mut dyn Read) -> io::Result<Self>;
}

impl LeveledModel for PhraseModel {
    fn apply(&self, sentence: &[String]) -> Sentence {
        Self::apply(self, sentence)
    }

    fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.save(writer).map_err(io::Error::from)
    }

    fn read_from(reader: &mut dyn Read) -> io::Result<Self> {
        Self::load(reader).map_err(io::Error::from)
    }
}

/// Runs a sentence through every level, lowest first.
#[must_use]
pub fn apply_levels<M: LeveledModel>(levels: &[M], sentence: Sentence) -> Sentence {
    levels
        .iter()
        .fold(sentence, |sentence, model| model.apply(&sentence))
}
