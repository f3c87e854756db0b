use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// One page of the wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub title: String,
    /// Fields whose `group` equals this key are rendered on the step.
    pub group: String,
    /// Stable identifier used for deep links.
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_if: Option<Condition>,
    /// Marks a document-upload step instead of a field step.
    #[serde(default)]
    pub show_documents: bool,
}

impl StepDefinition {
    pub fn new(title: impl Into<String>, group: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            group: group.into(),
            slug: slug.into(),
            description: None,
            show_if: None,
            show_documents: false,
        }
    }

    pub fn show_if(mut self, condition: Condition) -> Self {
        self.show_if = Some(condition);
        self
    }

    pub fn documents(mut self) -> Self {
        self.show_documents = true;
        self
    }
}
