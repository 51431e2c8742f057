//! Documents flowing through a pipeline.

use serde::{Deserialize, Serialize};

/// A tokenized sentence.
pub type Sentence = Vec<String>;

/// The payload of a document: raw text, or text already split into
/// sentences of word tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    /// Untokenized text.
    Text(String),
    /// Sentences of word tokens.
    Sentences(Vec<Sentence>),
}

/// A single document (one row of the source column) and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document content.
    pub content: Content,
    /// Row metadata carried alongside the content.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Creates a text document.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            metadata: serde_json::Map::new(),
        }
    }

    /// Creates a tokenized document.
    #[must_use]
    pub fn sentences(sentences: Vec<Sentence>) -> Self {
        Self {
            content: Content::Sentences(sentences),
            metadata: serde_json::Map::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a document with new content and the same metadata.
    #[must_use]
    pub fn with_content(self, content: Content) -> Self {
        Self {
            content,
            metadata: self.metadata,
        }
    }

    /// Returns true once the document has been split into sentences.
    #[must_use]
    pub const fn is_tokenized(&self) -> bool {
        matches!(self.content, Content::Sentences(_))
    }

    /// Renders the document as text.
    ///
    /// Tokenized content is re-joined: words with a space, sentences with
    /// `". "`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Sentences(sentences) => join_sentences(sentences),
        }
    }
}

/// Joins tokenized sentences back into document text.
#[must_use]
pub fn join_sentences(sentences: &[Sentence]) -> String {
    sentences
        .iter()
        .map(|sentence| sentence.join(" "))
        .collect::<Vec<_>>()
        .join(". ")
}
