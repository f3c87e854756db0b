use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::answers::{AnswerRecord, answer_matches, is_truthy};

/// Outcome assigned to a condition whose shape is not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    /// Treat the unknown shape as satisfied.
    #[default]
    Visible,
    /// Treat the unknown shape as unsatisfied.
    Hidden,
}

impl VisibilityMode {
    fn outcome(self) -> bool {
        matches!(self, VisibilityMode::Visible)
    }
}

/// Combinator of a complex condition. Unrecognized operators (including non-string
/// ones) are kept as text and always evaluate to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum Operator {
    And,
    Or,
    Unknown(String),
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "and" => Operator::And,
            "or" => Operator::Or,
            _ => Operator::Unknown(value),
        }
    }
}

impl From<Value> for Operator {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => Operator::from(name),
            other => Operator::Unknown(other.to_string()),
        }
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        match operator {
            Operator::And => "and".into(),
            Operator::Or => "or".into(),
            Operator::Unknown(name) => name,
        }
    }
}

/// Declarative visibility rule used by `showIf` on fields and steps.
///
/// Shapes are told apart by their keys: `operator` selects a complex node, `field`
/// selects a comparison leaf, and anything else is kept verbatim as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Condition {
    Complex {
        #[schemars(with = "String")]
        operator: Operator,
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    Simple {
        field: String,
        /// An explicit `null` compares against null; only a missing key means "truthy".
        #[serde(
            default,
            deserialize_with = "present",
            skip_serializing_if = "Option::is_none"
        )]
        #[schemars(with = "Option<Value>")]
        value: Option<Value>,
        #[serde(
            default,
            deserialize_with = "present",
            skip_serializing_if = "Option::is_none"
        )]
        #[schemars(with = "Option<Value>")]
        not: Option<Value>,
    },
    Unrecognized(Value),
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Condition {
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Condition::Simple {
            field: field.into(),
            value: Some(value),
            not: None,
        }
    }

    pub fn not_equals(field: impl Into<String>, value: Value) -> Self {
        Condition::Simple {
            field: field.into(),
            value: None,
            not: Some(value),
        }
    }

    pub fn answered(field: impl Into<String>) -> Self {
        Condition::Simple {
            field: field.into(),
            value: None,
            not: None,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::Complex {
            operator: Operator::And,
            conditions,
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Complex {
            operator: Operator::Or,
            conditions,
        }
    }

    /// Evaluates with the default policy: unrecognized shapes count as satisfied.
    pub fn evaluate(&self, answers: &AnswerRecord) -> bool {
        self.evaluate_with(answers, VisibilityMode::default())
    }

    pub fn evaluate_with(&self, answers: &AnswerRecord, mode: VisibilityMode) -> bool {
        match self {
            Condition::Complex {
                operator,
                conditions,
            } => match operator {
                Operator::And => conditions
                    .iter()
                    .all(|condition| condition.evaluate_with(answers, mode)),
                Operator::Or => conditions
                    .iter()
                    .any(|condition| condition.evaluate_with(answers, mode)),
                Operator::Unknown(_) => false,
            },
            Condition::Simple { field, value, not } => {
                compare(answers.get(field), value.as_ref(), not.as_ref())
            }
            Condition::Unrecognized(_) => mode.outcome(),
        }
    }

    /// Field ids this condition reads, depth first.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Complex { conditions, .. } => {
                for condition in conditions {
                    condition.collect_fields(out);
                }
            }
            Condition::Simple { field, .. } => out.push(field),
            Condition::Unrecognized(_) => {}
        }
    }
}

fn compare(answer: Option<&Value>, expected: Option<&Value>, excluded: Option<&Value>) -> bool {
    if expected.is_none() && excluded.is_none() {
        return answer.is_some_and(is_truthy);
    }

    if let Some(expected) = expected
        && !answer.is_some_and(|answer| answer_matches(answer, expected))
    {
        return false;
    }

    if let Some(excluded) = excluded
        && answer.is_some_and(|answer| answer_matches(answer, excluded))
    {
        return false;
    }

    true
}
