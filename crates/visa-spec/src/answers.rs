use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat record of the applicant's answers keyed by field id.
///
/// A missing key means the field was never answered; an explicit empty string is a
/// deliberate empty answer. Both are falsy for condition checks but validation tells
/// them apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AnswerRecord {
    values: Map<String, Value>,
}

impl AnswerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object; any other JSON value yields an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    pub fn get(&self, field_id: &str) -> Option<&Value> {
        self.values.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.values.contains_key(field_id)
    }

    /// Stores an answer, returning the previous one.
    pub fn set(&mut self, field_id: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(field_id.into(), value)
    }

    pub fn remove(&mut self, field_id: &str) -> Option<Value> {
        self.values.remove(field_id)
    }

    /// Overlays `other` on top of this record; keys in `other` win.
    pub fn merge(&mut self, other: &AnswerRecord) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn merged_with(&self, other: &AnswerRecord) -> AnswerRecord {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// JavaScript-style truthiness of the stored answer. Absent answers are falsy.
    pub fn is_truthy(&self, field_id: &str) -> bool {
        self.get(field_id).is_some_and(is_truthy)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.values)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(&self.values)
    }
}

impl From<Map<String, Value>> for AnswerRecord {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, Value)> for AnswerRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strict equality between two answer values. Numbers compare by magnitude so that
/// `1` and `1.0` are equal.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Equality that treats an array answer as a set: the answer matches when it contains
/// `expected`.
pub fn answer_matches(answer: &Value, expected: &Value) -> bool {
    match answer {
        Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        _ => values_equal(answer, expected),
    }
}

/// A single validation failure, addressed by field id and path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationError {
    pub field_id: String,
    pub path: String,
    pub message: String,
    pub code: String,
}

impl ValidationError {
    pub fn new(
        field_id: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Errors keyed by path (`passportNumber`, `children[0].name`).
pub type ErrorMap = BTreeMap<String, ValidationError>;

/// Result of validating a set of fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Required fields that have no key in the record at all.
    pub missing_required: Vec<String>,
}

impl ValidationReport {
    /// Flattens the report into the inline error map shown next to each field.
    /// Missing required answers are reported with the `missing_required` code.
    pub fn into_error_map(self) -> ErrorMap {
        let mut map = ErrorMap::new();
        for field_id in self.missing_required {
            map.insert(
                field_id.clone(),
                ValidationError::new(
                    field_id.clone(),
                    field_id,
                    "this field is required",
                    "missing_required",
                ),
            );
        }
        for error in self.errors {
            map.entry(error.path.clone()).or_insert(error);
        }
        map
    }
}
