//! Document values exchanged between typed records and the attribute codec.
//!
//! `Value` is a tagged union mirroring the store's wire types. Numbers are
//! carried as decimal text so round-trips never lose precision. `Document`
//! is the field-identity-keyed container a record exposes to the codec; the
//! codec alone translates field identities to wire attribute names through
//! the schema.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// A single document value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    /// Arbitrary-precision decimal carried as text.
    Number(String),
    Binary(Vec<u8>),
    Bool(bool),
    Null,
    StringSet(BTreeSet<String>),
    NumberSet(BTreeSet<String>),
    BinarySet(BTreeSet<Vec<u8>>),
    List(Vec<Value>),
    /// Free-form map; keys pass through to the wire unchanged.
    Map(BTreeMap<String, Value>),
    /// Nested typed record; keys are field identities resolved through the
    /// nested type's own schema, never the outer one.
    Record(Document),
}

impl Value {
    pub fn from_i64(n: i64) -> Self {
        Value::Number(n.to_string())
    }

    pub fn from_u64(n: u64) -> Self {
        Value::Number(n.to_string())
    }

    pub fn from_f64(n: f64) -> Self {
        Value::Number(format_f64(n))
    }

    pub fn string_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::StringSet(values.into_iter().map(Into::into).collect())
    }

    pub fn number_set<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Value::NumberSet(values.into_iter().map(|n| n.to_string()).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&str> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.parse().ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(|n| n.parse().ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value is the empty value of its shape. Used by the
    /// codec's omit-empty handling.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Binary(b) => b.is_empty(),
            Value::Null => true,
            Value::StringSet(s) => s.is_empty(),
            Value::NumberSet(s) => s.is_empty(),
            Value::BinarySet(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Record(d) => d.is_empty(),
            Value::Number(_) | Value::Bool(_) => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::from_i64(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::from_u64(n)
    }
}

/// Ordered mapping from field identity to value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> &mut Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Inserts only when the value is present; absent optionals stay absent.
    pub fn insert_opt(&mut self, field: impl Into<String>, value: Option<Value>) -> &mut Self {
        if let Some(value) = value {
            self.fields.insert(field.into(), value);
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Get a required string field.
    pub fn string(&self, field: &str) -> Result<String> {
        self.get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::InvalidData(format!("Missing or invalid field: {field}")))
    }

    /// Get an optional string field; absence decodes to `None`.
    pub fn opt_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(|v| v.as_str()).map(str::to_string)
    }

    /// Get a required integer field.
    pub fn i64(&self, field: &str) -> Result<i64> {
        self.get(field)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::InvalidData(format!("Missing or invalid field: {field}")))
    }

    /// Get an optional integer field; absence decodes to `None`.
    pub fn opt_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(|v| v.as_i64())
    }

    /// Get a bool field, defaulting to `false` when absent.
    pub fn bool_or_default(&self, field: &str) -> bool {
        self.get(field).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Get a string-set field, defaulting to empty when absent.
    pub fn string_set_or_default(&self, field: &str) -> BTreeSet<String> {
        match self.get(field) {
            Some(Value::StringSet(s)) => s.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Get a nested record field.
    pub fn record(&self, field: &str) -> Result<&Document> {
        match self.get(field) {
            Some(Value::Record(doc)) => Ok(doc),
            Some(_) => Err(Error::InvalidData(format!(
                "Field {field} is not a nested record"
            ))),
            None => Err(Error::InvalidData(format!("Missing or invalid field: {field}"))),
        }
    }

    pub fn opt_record(&self, field: &str) -> Option<&Document> {
        match self.get(field) {
            Some(Value::Record(doc)) => Some(doc),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

fn format_f64(n: f64) -> String {
    let mut s = format!("{n}");
    // Keep integral floats in plain decimal form.
    if s.ends_with(".0") {
        s.truncate(s.len() - 2);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_preserves_text() {
        let v = Value::Number("3.141592653589793238462643".to_string());
        assert_eq!(v.as_number(), Some("3.141592653589793238462643"));
    }

    #[test]
    fn test_string_set_deduplicates() {
        let v = Value::string_set(["a", "b", "a"]);
        match &v {
            Value::StringSet(s) => {
                assert_eq!(s.len(), 2);
                assert!(s.contains("a") && s.contains("b"));
            }
            _ => panic!("expected string set"),
        }
    }

    #[test]
    fn test_is_empty() {
        assert!(Value::String(String::new()).is_empty());
        assert!(Value::Null.is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::Number("0".to_string()).is_empty());
    }

    #[test]
    fn test_document_required_string() {
        let mut doc = Document::new();
        doc.insert("name", Value::from("Acme"));
        assert_eq!(doc.string("name").unwrap(), "Acme");
        assert!(doc.string("missing").is_err());
    }

    #[test]
    fn test_document_optional_absent_is_none() {
        let doc = Document::new();
        assert_eq!(doc.opt_string("missing"), None);
        assert_eq!(doc.opt_i64("missing"), None);
        assert!(!doc.bool_or_default("missing"));
        assert!(doc.string_set_or_default("missing").is_empty());
    }

    #[test]
    fn test_document_insert_opt() {
        let mut doc = Document::new();
        doc.insert_opt("present", Some(Value::from("x")));
        doc.insert_opt("absent", None);
        assert!(doc.get("present").is_some());
        assert!(doc.get("absent").is_none());
    }

    #[test]
    fn test_i64_round_trip() {
        let v = Value::from_i64(-42);
        assert_eq!(v.as_i64(), Some(-42));
    }
}
