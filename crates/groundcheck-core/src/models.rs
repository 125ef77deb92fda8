//! Core data models used throughout Groundcheck.
//!
//! These types represent the documents, chunks, and test cases that flow
//! through the ingestion, retrieval, and synthesis pipeline.

use serde::{Deserialize, Serialize};

/// A text-bearing document read at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier (the source path for filesystem ingestion).
    pub id: String,
    /// Human-readable provenance name, e.g. `"rules/discounts.md"`.
    pub source: String,
    pub body: String,
}

impl Document {
    pub fn new(source: impl Into<String>, body: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id: source.clone(),
            source,
            body: body.into(),
        }
    }
}

/// A bounded window of a document's body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// UUIDv5 derived from the document ID and chunk index.
    pub id: String,
    pub document_id: String,
    /// Provenance name copied from the parent [`Document`].
    pub source: String,
    pub chunk_index: usize,
    /// Character offset of the window start inside the document body.
    pub offset: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Provenance handle used by [`TestCase::grounded_in`]: `"{source}#{index}"`.
    pub fn reference(&self) -> String {
        format!("{}#{}", self.source, self.chunk_index)
    }
}

/// A chunk paired with its normalized similarity to a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Similarity in `[0.0, 1.0]`; higher is more similar.
    pub score: f64,
}

/// A structured QA test case produced by the test case synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(alias = "id", alias = "test_case_id")]
    pub test_id: String,
    #[serde(default, alias = "test_scenario", alias = "summary")]
    pub description: String,
    #[serde(default, alias = "expected")]
    pub expected_result: String,
    #[serde(default)]
    pub grounded_in: String,
}

impl TestCase {
    /// The description, if it carries any non-whitespace text.
    pub fn description(&self) -> Option<&str> {
        let d = self.description.trim();
        if d.is_empty() {
            None
        } else {
            Some(d)
        }
    }
}

/// Source text of a generated automation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedScript {
    pub test_id: String,
    /// Name of the business rule that directed generation.
    pub rule: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_reference() {
        let chunk = Chunk {
            id: "x".into(),
            document_id: "docs/rules.md".into(),
            source: "docs/rules.md".into(),
            chunk_index: 4,
            offset: 3200,
            text: "SAVE15 gives 15% off".into(),
            hash: String::new(),
        };
        assert_eq!(chunk.reference(), "docs/rules.md#4");
    }

    #[test]
    fn test_test_case_aliases() {
        let tc: TestCase = serde_json::from_str(
            r#"{"id": "TC-9", "summary": "apply SAVE15", "expected": "15% off"}"#,
        )
        .unwrap();
        assert_eq!(tc.test_id, "TC-9");
        assert_eq!(tc.description(), Some("apply SAVE15"));
        assert_eq!(tc.expected_result, "15% off");
        assert_eq!(tc.grounded_in, "");
    }

    #[test]
    fn test_blank_description_is_none() {
        let tc = TestCase {
            test_id: "T".into(),
            description: "   ".into(),
            expected_result: String::new(),
            grounded_in: String::new(),
        };
        assert_eq!(tc.description(), None);
    }

    #[test]
    fn test_serializes_with_canonical_keys() {
        let tc = TestCase {
            test_id: "DC1".into(),
            description: "empty cart discount".into(),
            expected_result: "no change".into(),
            grounded_in: "doc1".into(),
        };
        let v = serde_json::to_value(&tc).unwrap();
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(v["grounded_in"], "doc1");
    }
}
