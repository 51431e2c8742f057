//! In-memory data source.

use super::{row_to_document, DataSource, Row};
use crate::errors::CorpusflowError;
use crate::pipeline::DocumentStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A data source backed by rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataSource {
    id: String,
    base_path: PathBuf,
    rows: Arc<Vec<Row>>,
}

impl InMemoryDataSource {
    /// Creates a data source from rows.
    #[must_use]
    pub fn new(id: impl Into<String>, base_path: impl Into<PathBuf>, rows: Vec<Row>) -> Self {
        Self {
            id: id.into(),
            base_path: base_path.into(),
            rows: Arc::new(rows),
        }
    }

    /// Creates a single-column data source from texts.
    #[must_use]
    pub fn from_texts<I, S>(
        id: impl Into<String>,
        base_path: impl Into<PathBuf>,
        column: &str,
        texts: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = texts
            .into_iter()
            .map(|text| {
                let mut row = Row::new();
                row.insert(column.to_string(), serde_json::Value::String(text.into()));
                row
            })
            .collect();
        Self::new(id, base_path, rows)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DataSource for InMemoryDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn documents(&self, column: &str) -> Result<DocumentStream, CorpusflowError> {
        let rows = Arc::clone(&self.rows);
        let column = column.to_string();
        let len = rows.len();
        Ok(Box::new((0..len).filter_map(move |i| {
            row_to_document(rows[i].clone(), &column).map(Ok::<_, CorpusflowError>)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_in_row_order() {
        let source = InMemoryDataSource::from_texts("A", "/tmp/a", "text", ["one", "two", "three"]);
        let texts: Vec<_> = source
            .documents("text")
            .unwrap()
            .map(|d| d.unwrap().to_text())
            .collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_missing_column_yields_nothing() {
        let source = InMemoryDataSource::from_texts("A", "/tmp/a", "text", ["one"]);
        assert_eq!(source.documents("body").unwrap().count(), 0);
    }
}
