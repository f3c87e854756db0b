use std::collections::BTreeSet;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::{Condition, VisibilityMode};
use crate::spec::document::DocumentDefinition;
use crate::spec::field::FieldDefinition;
use crate::spec::step::StepDefinition;

pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 500;

fn default_debounce_ms() -> u64 {
    DEFAULT_PERSIST_DEBOUNCE_MS
}

/// Runtime knobs carried by a form definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormPolicy {
    /// What an unrecognized condition shape resolves to.
    #[serde(default)]
    pub malformed_conditions: VisibilityMode,
    #[serde(default = "default_debounce_ms")]
    pub persist_debounce_ms: u64,
}

impl Default for FormPolicy {
    fn default() -> Self {
        Self {
            malformed_conditions: VisibilityMode::default(),
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
        }
    }
}

impl FormPolicy {
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Problems found while loading or checking a form definition.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to parse form definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("field '{0}' is defined more than once")]
    DuplicateField(String),
    #[error("document '{0}' is defined more than once")]
    DuplicateDocument(String),
    #[error("step slug '{0}' is used more than once")]
    DuplicateSlug(String),
    #[error("step '{slug}' has no fields in group '{group}' and is not a document step")]
    EmptyStep { slug: String, group: String },
}

/// Declarative questionnaire for one destination country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub documents: Vec<DocumentDefinition>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub policy: FormPolicy,
}

impl FormDefinition {
    pub fn from_json_str(json: &str) -> Result<Self, FormError> {
        let form: FormDefinition = serde_json::from_str(json)?;
        form.check()?;
        Ok(form)
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn fields_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a FieldDefinition> + 'a {
        self.fields.iter().filter(move |field| field.group == group)
    }

    /// Structural checks that catch broken catalogs at load time. Conditions that
    /// reference unknown fields are only logged, since they simply never match.
    pub fn check(&self) -> Result<(), FormError> {
        let mut field_ids = BTreeSet::new();
        for field in &self.fields {
            if !field_ids.insert(field.id.as_str()) {
                return Err(FormError::DuplicateField(field.id.clone()));
            }
        }

        let mut document_ids = BTreeSet::new();
        for document in &self.documents {
            if !document_ids.insert(document.id.as_str()) {
                return Err(FormError::DuplicateDocument(document.id.clone()));
            }
        }

        let mut slugs = BTreeSet::new();
        for step in &self.steps {
            if !slugs.insert(step.slug.as_str()) {
                return Err(FormError::DuplicateSlug(step.slug.clone()));
            }
            if !step.show_documents && self.fields_in_group(&step.group).next().is_none() {
                return Err(FormError::EmptyStep {
                    slug: step.slug.clone(),
                    group: step.group.clone(),
                });
            }
        }

        let field_conditions = self
            .fields
            .iter()
            .filter_map(|field| field.show_if.as_ref().map(|c| (field.id.as_str(), c)));
        let step_conditions = self
            .steps
            .iter()
            .filter_map(|step| step.show_if.as_ref().map(|c| (step.slug.as_str(), c)));
        for (owner, condition) in field_conditions.chain(step_conditions) {
            warn_unknown_references(owner, condition, &field_ids);
        }

        Ok(())
    }
}

fn warn_unknown_references(owner: &str, condition: &Condition, known: &BTreeSet<&str>) {
    for field in condition.referenced_fields() {
        if !known.contains(field) {
            tracing::warn!(owner, field, "condition references an undefined field");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::FieldKind;
    use serde_json::json;

    fn minimal() -> FormDefinition {
        FormDefinition {
            id: "de".into(),
            title: "Germany".into(),
            version: None,
            fields: vec![FieldDefinition::new("firstName", "personal", FieldKind::Text)],
            documents: vec![],
            steps: vec![StepDefinition::new("Personal", "personal", "personal")],
            policy: FormPolicy::default(),
        }
    }

    #[test]
    fn parses_camel_case_definition() {
        let form = FormDefinition::from_json_str(
            &json!({
                "id": "fr",
                "title": "France",
                "fields": [
                    {
                        "id": "visitPurpose",
                        "group": "trip",
                        "type": "select",
                        "label": "Purpose",
                        "required": true,
                        "options": ["tourism", { "value": "study", "label": "Study" }]
                    },
                    {
                        "id": "school",
                        "group": "trip",
                        "type": "text",
                        "label": "School",
                        "dependencies": [{ "fieldId": "visitPurpose", "value": "study" }]
                    }
                ],
                "documents": [
                    {
                        "id": "acceptance",
                        "name": "Acceptance letter",
                        "required": true,
                        "conditions": [{ "questionId": "visitPurpose", "value": "study" }]
                    }
                ],
                "steps": [
                    { "title": "Trip", "group": "trip", "slug": "trip" },
                    { "title": "Uploads", "group": "docs", "slug": "docs", "showDocuments": true }
                ],
                "policy": { "malformedConditions": "hidden" }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(form.fields[1].dependencies[0].field_id, "visitPurpose");
        assert_eq!(form.fields[0].option_values().collect::<Vec<_>>(), vec!["tourism", "study"]);
        assert!(form.steps[1].show_documents);
        assert_eq!(form.policy.malformed_conditions, VisibilityMode::Hidden);
        assert_eq!(form.policy.persist_debounce_ms, DEFAULT_PERSIST_DEBOUNCE_MS);
    }

    #[test]
    fn rejects_duplicate_field_ids() {
        let mut form = minimal();
        form.fields
            .push(FieldDefinition::new("firstName", "personal", FieldKind::Text));
        assert!(matches!(form.check(), Err(FormError::DuplicateField(id)) if id == "firstName"));
    }

    #[test]
    fn rejects_duplicate_slugs() {
        let mut form = minimal();
        form.steps
            .push(StepDefinition::new("Again", "personal", "personal"));
        assert!(matches!(form.check(), Err(FormError::DuplicateSlug(_))));
    }

    #[test]
    fn rejects_field_step_without_fields() {
        let mut form = minimal();
        form.steps.push(StepDefinition::new("Travel", "travel", "travel"));
        assert!(matches!(form.check(), Err(FormError::EmptyStep { .. })));

        form.steps.pop();
        form.steps
            .push(StepDefinition::new("Uploads", "uploads", "uploads").documents());
        assert!(form.check().is_ok());
    }
}
