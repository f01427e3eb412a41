//! Raw search-index documents and the small query vocabulary the core needs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LocitagError, Result};

/// An index (and optional document type) holding one kind of record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionRef {
    pub index: String,
    #[serde(default)]
    pub doc_type: Option<String>,
}

impl CollectionRef {
    pub fn new(index: &str, doc_type: Option<&str>) -> Self {
        Self { index: index.to_string(), doc_type: doc_type.map(String::from) }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.doc_type {
            Some(t) => write!(f, "{}/{}", self.index, t),
            None => write!(f, "{}", self.index),
        }
    }
}

/// A stored record: its id plus the raw `_source` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, source: Value) -> Self {
        Self { id: id.into(), source }
    }

    /// Look up a dotted field path (`build_info.seqid`) inside `_source`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.source, |value, key| value.as_object()?.get(key))
    }

    pub fn field_str(&self, path: &str) -> Option<String> {
        match self.field(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Integer coordinate field; numeric strings are accepted.
    pub fn field_u64(&self, path: &str) -> Option<u64> {
        match self.field(path)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Deserialize `_source` into a typed record; failures are record-format errors.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.source.clone())
            .map_err(|e| LocitagError::record_format(&self.id, e.to_string()))
    }

    /// Copy of this document keeping only the listed source fields.
    /// Dotted paths keep their top-level key. An empty list keeps everything.
    pub fn project(&self, fields: &[String]) -> Document {
        if fields.is_empty() {
            return self.clone();
        }
        let mut kept = Map::new();
        if let Value::Object(obj) = &self.source {
            for field in fields {
                let top = field.split('.').next().unwrap_or(field);
                if let Some(v) = obj.get(top) {
                    kept.insert(top.to_string(), v.clone());
                }
            }
        }
        Document::new(self.id.clone(), Value::Object(kept))
    }
}

/// Term filter: every listed field must equal the given value.
/// Numbers and their string renderings compare equal (`38` == `"38"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFilter {
    pub terms: BTreeMap<String, Value>,
}

impl RecordFilter {
    pub fn term(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.terms.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.terms.iter().all(|(field, expected)| {
            doc.field(field).is_some_and(|actual| loosely_equal(actual, expected))
        })
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == s.trim()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gene_doc() -> Document {
        Document::new("ENSG00000136634", json!({
            "chromosome": "1", "start": 206767602, "stop": "206772494",
            "build_info": {"build": 38, "seqid": "1"}
        }))
    }

    #[test]
    fn test_dotted_field_lookup() {
        let doc = gene_doc();
        assert_eq!(doc.field_str("build_info.seqid"), Some("1".to_string()));
        assert_eq!(doc.field_u64("start"), Some(206767602));
        assert_eq!(doc.field_u64("stop"), Some(206772494));
        assert!(doc.field("build_info.end").is_none());
        assert!(doc.field("chromosome.inner").is_none());
    }

    #[test]
    fn test_filter_compares_numbers_and_strings() {
        let doc = gene_doc();
        assert!(RecordFilter::default().term("build_info.build", "38").matches(&doc));
        assert!(RecordFilter::default().term("build_info.build", 38).matches(&doc));
        assert!(!RecordFilter::default().term("build_info.build", "37").matches(&doc));
        assert!(RecordFilter::default().matches(&doc));
    }

    #[test]
    fn test_project_keeps_top_level_keys() {
        let doc = gene_doc().project(&["start".to_string(), "build_info.seqid".to_string()]);
        assert!(doc.field("start").is_some());
        assert!(doc.field("build_info.build").is_some());
        assert!(doc.field("chromosome").is_none());
    }

    #[test]
    fn test_parse_failure_is_record_format() {
        #[derive(Debug, Deserialize)]
        struct NeedsName {
            #[allow(dead_code)]
            name: String,
        }
        let err = gene_doc().parse::<NeedsName>().unwrap_err();
        assert!(matches!(err, LocitagError::RecordFormat { ref record_id, .. } if record_id == "ENSG00000136634"));
    }

    #[test]
    fn test_collection_display() {
        assert_eq!(CollectionRef::new("regions_v0.0.5", Some("region")).to_string(), "regions_v0.0.5/region");
        assert_eq!(CollectionRef::new("studies_latest", None).to_string(), "studies_latest");
    }
}
