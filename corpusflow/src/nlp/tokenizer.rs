//! Sentence and word tokenization.

use crate::core::{Content, Document, Sentence};
use regex::Regex;
use std::fmt::Debug;
use std::sync::OnceLock;

/// Splits text into sentences of word tokens.
pub trait Tokenizer: Send + Sync + Debug {
    /// Tokenizes text.
    fn tokenize(&self, text: &str) -> Vec<Sentence>;

    /// Tokenizes a document, keeping its metadata. Documents that are
    /// already tokenized are returned unchanged.
    fn tokenize_document(&self, document: Document) -> Document {
        match &document.content {
            Content::Sentences(_) => document,
            Content::Text(text) => {
                let sentences = self.tokenize(text);
                document.with_content(Content::Sentences(sentences))
            }
        }
    }
}

#[allow(clippy::expect_used)]
fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?;]+(?:\s+|$)|\n+").expect("valid sentence regex"))
}

#[allow(clippy::expect_used)]
fn word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+(?:['’\-]\w+)*").expect("valid word regex"))
}

/// Regex-based tokenizer.
///
/// Sentences end at `.`, `!`, `?`, `;` followed by whitespace, or at line
/// breaks. Words are runs of word characters, allowing inner apostrophes
/// and hyphens. Empty sentences are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTokenizer {
    lowercase: bool,
}

impl RegexTokenizer {
    /// Creates a case-preserving tokenizer.
    #[must_use]
    pub const fn new() -> Self {
        Self { lowercase: false }
    }

    /// Lowercases every token.
    #[must_use]
    pub const fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Sentence> {
        sentence_boundary()
            .split(text)
            .map(|sentence| {
                word()
                    .find_iter(sentence)
                    .map(|m| {
                        if self.lowercase {
                            m.as_str().to_lowercase()
                        } else {
                            m.as_str().to_string()
                        }
                    })
                    .collect::<Sentence>()
            })
            .filter(|sentence| !sentence.is_empty())
            .collect()
    }
}
