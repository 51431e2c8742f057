//! Data sources: where a pipeline's documents come from.
//!
//! A data source turns one column of its rows into a lazy document stream
//! and owns a storage directory where artifacts derived from it are kept.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesDataSource;
pub use memory::InMemoryDataSource;

use crate::core::Document;
use crate::errors::CorpusflowError;
use crate::pipeline::DocumentStream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// A row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A corpus the pipeline engine can read from.
pub trait DataSource: Send + Sync + Debug {
    /// Returns the data source identifier.
    fn id(&self) -> &str;

    /// Returns the directory where artifacts derived from this source live.
    fn base_path(&self) -> &Path;

    /// Streams one column as documents, in row order.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened.
    fn documents(&self, column: &str) -> Result<DocumentStream, CorpusflowError>;
}

/// Converts a row into a document, or `None` if the column is missing or
/// not text. The remaining columns become document metadata.
pub(crate) fn row_to_document(mut row: Row, column: &str) -> Option<Document> {
    match row.remove(column) {
        Some(serde_json::Value::String(text)) => {
            let mut doc = Document::text(text);
            doc.metadata = row;
            Some(doc)
        }
        other => {
            tracing::debug!(column, value = ?other, "Skipping row without text");
            None
        }
    }
}

/// Registry of data sources by id.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

impl DataSourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a data source, replacing any previous one with the same id.
    pub fn register(&self, source: Arc<dyn DataSource>) {
        let id = source.id().to_string();
        if self.sources.write().insert(id.clone(), source).is_some() {
            tracing::warn!(data_source = %id, "Replaced registered data source");
        }
    }

    /// Looks up a data source.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusflowError::UnknownDataSource`] if none is registered.
    pub fn get(&self, id: &str) -> Result<Arc<dyn DataSource>, CorpusflowError> {
        self.sources
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CorpusflowError::UnknownDataSource(id.to_string()))
    }

    /// Lists registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Debug for DataSourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceRegistry")
            .field("sources", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_to_document_moves_other_columns_to_metadata() {
        let row = json!({"text": "hello", "id": 7}).as_object().cloned().unwrap();
        let doc = row_to_document(row, "text").unwrap();
        assert_eq!(doc.to_text(), "hello");
        assert_eq!(doc.metadata.get("id"), Some(&json!(7)));
        assert!(!doc.metadata.contains_key("text"));
    }

    #[test]
    fn test_row_without_text_is_skipped() {
        let row = json!({"text": 3}).as_object().cloned().unwrap();
        assert!(row_to_document(row, "text").is_none());
        let row = json!({"other": "x"}).as_object().cloned().unwrap();
        assert!(row_to_document(row, "text").is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = DataSourceRegistry::new();
        registry.register(Arc::new(InMemoryDataSource::new("A", "/tmp/a", Vec::new())));

        assert!(registry.get("A").is_ok());
        assert!(matches!(
            registry.get("B"),
            Err(CorpusflowError::UnknownDataSource(id)) if id == "B"
        ));
        assert_eq!(registry.ids(), ["A"]);
    }
}
