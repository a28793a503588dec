//! Vector record and search result types.
//!
//! [`VectorRecord`] is the canonical JSON interchange form
//! (`{id?, vector, metadata?}`) used by import/export layers; the coordinator
//! assigns the id when it is absent.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Metadata attached to a vector: a mapping from string keys to JSON values.
pub type Metadata = serde_json::Map<String, JsonValue>;

/// A vector record in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier. Optional on input; assigned by the coordinator
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The vector values.
    pub vector: Vec<f32>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorRecord {
    /// Creates a record with an assigned id.
    #[must_use]
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Option<Metadata>) -> Self {
        Self {
            id: Some(id.into()),
            vector,
            metadata,
        }
    }

    /// Creates a record without an id, for the coordinator to assign one.
    #[must_use]
    pub fn unassigned(vector: Vec<f32>, metadata: Option<Metadata>) -> Self {
        Self {
            id: None,
            vector,
            metadata,
        }
    }

    /// Returns the dimension of the vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Id of the matching vector.
    pub id: String,

    /// Distance to the query ("smaller is closer", similarity metrics are
    /// complemented).
    pub distance: f32,

    /// Metadata of the matching vector, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl SearchMatch {
    /// Creates a new search match.
    #[must_use]
    pub const fn new(id: String, distance: f32, metadata: Option<Metadata>) -> Self {
        Self {
            id,
            distance,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interchange_round_trip() {
        let payload = r#"[{"vector":[1.0,2.0,3.0],"metadata":{"label":"a"}},{"vector":[4.0,5.0,6.0],"metadata":{"label":"b"}}]"#;
        let records: Vec<VectorRecord> = serde_json::from_str(payload).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, None);
        assert_eq!(records[0].dimension(), 3);
        assert_eq!(
            records[1].metadata.as_ref().unwrap().get("label"),
            Some(&json!("b"))
        );

        let out = serde_json::to_string(&records).unwrap();
        let back: Vec<VectorRecord> = serde_json::from_str(&out).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_id_survives_serialization() {
        let record = VectorRecord::new("abc", vec![1.0], None);
        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains("\"id\":\"abc\""));
        assert!(!out.contains("metadata"));
    }
}
