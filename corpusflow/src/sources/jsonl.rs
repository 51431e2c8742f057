//! JSON-lines file data source.

use super::{row_to_document, DataSource, Row};
use crate::errors::CorpusflowError;
use crate::pipeline::{deferred, DocumentStream};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

/// A data source reading one JSON object per line from a file.
///
/// The file is opened when the first document is pulled. Lines that are
/// blank or not JSON objects are skipped with a warning.
#[derive(Debug, Clone)]
pub struct JsonLinesDataSource {
    id: String,
    base_path: PathBuf,
    file: PathBuf,
}

impl JsonLinesDataSource {
    /// Creates a data source over `file`, storing artifacts in `base_path`.
    #[must_use]
    pub fn new(id: impl Into<String>, base_path: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            base_path: base_path.into(),
            file: file.into(),
        }
    }

    /// Returns the file being read.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl DataSource for JsonLinesDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn documents(&self, column: &str) -> Result<DocumentStream, CorpusflowError> {
        let path = self.file.clone();
        let column = column.to_string();
        Ok(deferred(move || {
            let reader = BufReader::new(File::open(&path)?);
            let stream = reader
                .lines()
                .enumerate()
                .filter_map(move |(line_no, line)| {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) if err.kind() == ErrorKind::InvalidData => {
                            tracing::warn!(line = line_no + 1, error = %err, "Skipping undecodable row");
                            return None;
                        }
                        Err(err) => return Some(Err(CorpusflowError::Io(err))),
                    };
                    if line.trim().is_empty() {
                        return None;
                    }
                    match serde_json::from_str::<Row>(&line) {
                        Ok(row) => row_to_document(row, &column).map(Ok),
                        Err(err) => {
                            tracing::warn!(line = line_no + 1, error = %err, "Skipping malformed row");
                            None
                        }
                    }
                });
            Ok(Box::new(stream) as DocumentStream)
        }))
    }
}
