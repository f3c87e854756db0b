use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gate on a document: the answer to `question_id` must match `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCondition {
    pub question_id: String,
    pub value: Value,
}

/// A supporting document the applicant may have to upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<DocumentCondition>,
}

impl DocumentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            required: true,
            conditions: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn when(mut self, question_id: impl Into<String>, value: Value) -> Self {
        self.conditions.push(DocumentCondition {
            question_id: question_id.into(),
            value,
        });
        self
    }
}
