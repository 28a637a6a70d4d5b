//! Input emails for the analyzer.
//!
//! A [`DocumentSource`] is fixed once built: ordered, finite and read-only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample mailbox compiled into the crate
const BUNDLED_EMAILS: &str = include_str!("../data/sample_emails.json");

/// One email to analyze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub body: String,
    /// RFC 3339 timestamp as received
    pub received_at: String,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse documents: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate document id: {0}")]
    DuplicateId(String),
}

/// Ordered collection of documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSource {
    documents: Vec<Document>,
}

impl DocumentSource {
    /// Build a source, rejecting duplicate ids
    pub fn new(documents: Vec<Document>) -> Result<Self, DocumentError> {
        let mut seen = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !seen.insert(doc.id.as_str()) {
                return Err(DocumentError::DuplicateId(doc.id.clone()));
            }
        }
        Ok(Self { documents })
    }

    /// The sample mailbox shipped with the crate
    pub fn bundled() -> Result<Self, DocumentError> {
        Self::from_json_str(BUNDLED_EMAILS)
    }

    /// Parse a JSON array of documents
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        let documents: Vec<Document> = serde_json::from_str(json)?;
        Self::new(documents)
    }

    /// Load a JSON array of documents from disk
    pub fn from_json_file(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_json_str(&content)?;
        tracing::debug!(path = ?path, count = source.len(), "Loaded documents");
        Ok(source)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }
}

impl<'a> IntoIterator for &'a DocumentSource {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
pub(crate) fn doc(id: &str, body: &str) -> Document {
    Document {
        id: id.to_string(),
        sender: format!("{}@example.com", id),
        subject: format!("Subject {}", id),
        snippet: body.chars().take(40).collect(),
        body: body.to_string(),
        received_at: "2026-10-01T00:00:00Z".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dataset_loads_in_order() {
        let source = DocumentSource::bundled().unwrap();
        assert!(!source.is_empty());
        assert_eq!(source.documents()[0].id, "e1");
        let ids: Vec<&str> = source.iter().map(|d| d.id.as_str()).collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_wire_format_uses_received_at() {
        let json = r#"[{"id":"a","sender":"s","subject":"sub","snippet":"sn","body":"Total: $1","receivedAt":"2026-01-01T00:00:00Z"}]"#;
        let source = DocumentSource::from_json_str(json).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.documents()[0].received_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = DocumentSource::new(vec![doc("x", "1"), doc("y", "2"), doc("x", "3")]).unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateId(ref id) if id == "x"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DocumentSource::from_json_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.json");
        let docs = vec![doc("e1", "Total: $42.10"), doc("e2", "no amount")];
        std::fs::write(&path, serde_json::to_string(&docs).unwrap()).unwrap();

        let source = DocumentSource::from_json_file(&path).unwrap();
        assert_eq!(source.documents(), docs.as_slice());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = DocumentSource::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }
}
