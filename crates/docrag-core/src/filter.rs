//! Equality/range constraints over record metadata.
//!
//! A filter is a conjunction of per-field conditions. Backends translate it to
//! their own dialect; the in-memory store evaluates it with [`MetadataFilter::matches`].

use serde_json::Value;

use crate::metadata::DOCUMENT_ID;
use crate::types::Metadata;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
}

impl Condition {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => value.is_some_and(|v| values_equal(v, expected)),
            Self::Ne(expected) => !value.is_some_and(|v| values_equal(v, expected)),
            Self::In(options) => value.is_some_and(|v| options.iter().any(|o| values_equal(v, o))),
            Self::Gt(bound) => number(value).is_some_and(|n| n > *bound),
            Self::Gte(bound) => number(value).is_some_and(|n| n >= *bound),
            Self::Lt(bound) => number(value).is_some_and(|n| n < *bound),
            Self::Lte(bound) => number(value).is_some_and(|n| n <= *bound),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<(String, Condition)>,
}

impl MetadataFilter {
    pub fn new() -> Self { Self::default() }

    /// Restrict results to a single document.
    pub fn document(document_id: &str) -> Self {
        Self::new().eq(DOCUMENT_ID, document_id)
    }

    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self { self.with(field, Condition::Eq(value.into())) }
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self { self.with(field, Condition::Ne(value.into())) }
    pub fn any_of<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.with(field, Condition::In(values.into_iter().map(Into::into).collect()))
    }
    pub fn gt(self, field: impl Into<String>, bound: f64) -> Self { self.with(field, Condition::Gt(bound)) }
    pub fn gte(self, field: impl Into<String>, bound: f64) -> Self { self.with(field, Condition::Gte(bound)) }
    pub fn lt(self, field: impl Into<String>, bound: f64) -> Self { self.with(field, Condition::Lt(bound)) }
    pub fn lte(self, field: impl Into<String>, bound: f64) -> Self { self.with(field, Condition::Lte(bound)) }

    pub fn conditions(&self) -> &[(String, Condition)] { &self.conditions }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(field, cond)| cond.matches(metadata.get(field)))
    }
}

// Backends hand integers back as floats, so numbers compare by value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        match v { Value::Object(m) => m, _ => panic!("expected object") }
    }

    #[test]
    fn document_filter_matches_only_that_document() {
        let f = MetadataFilter::document("doc1");
        assert!(f.matches(&meta(json!({ "document_id": "doc1" }))));
        assert!(!f.matches(&meta(json!({ "document_id": "doc2" }))));
        assert!(!f.matches(&meta(json!({}))));
    }

    #[test]
    fn range_and_equality_combine_as_conjunction() {
        let f = MetadataFilter::document("doc1").gte("chunk_index", 1.0).lt("chunk_index", 3.0);
        assert!(f.matches(&meta(json!({ "document_id": "doc1", "chunk_index": 2 }))));
        assert!(f.matches(&meta(json!({ "document_id": "doc1", "chunk_index": 1.0 }))));
        assert!(!f.matches(&meta(json!({ "document_id": "doc1", "chunk_index": 3 }))));
        assert!(!f.matches(&meta(json!({ "document_id": "doc1" }))));
    }

    #[test]
    fn integer_equality_tolerates_float_encoding() {
        let f = MetadataFilter::new().eq("node_index", 4);
        assert!(f.matches(&meta(json!({ "node_index": 4.0 }))));
    }

    #[test]
    fn ne_and_in() {
        let f = MetadataFilter::new().ne("document_id", "skip").any_of("node_index", [1, 2]);
        assert!(f.matches(&meta(json!({ "document_id": "keep", "node_index": 2 }))));
        assert!(!f.matches(&meta(json!({ "document_id": "skip", "node_index": 2 }))));
        assert!(!f.matches(&meta(json!({ "document_id": "keep", "node_index": 3 }))));
    }
}
