use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;

/// Closed set of input kinds a field can render as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Email,
    Tel,
    Number,
    Date,
    Select,
    Radio,
    Checkbox,
    Multiselect,
    Country,
    /// Repeating list of dependent persons (children, spouse, ...).
    Dependents,
    /// Repeating list of travel destinations.
    Itinerary,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Email => "email",
            FieldKind::Tel => "tel",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Multiselect => "multiselect",
            FieldKind::Country => "country",
            FieldKind::Dependents => "dependents",
            FieldKind::Itinerary => "itinerary",
        }
    }

    /// Composite kinds hold a list of sub-records and report their own error state.
    pub fn is_composite(&self) -> bool {
        matches!(self, FieldKind::Dependents | FieldKind::Itinerary)
    }

    /// Kinds whose answer must be one of the declared options.
    pub fn has_options(&self) -> bool {
        matches!(
            self,
            FieldKind::Select | FieldKind::Radio | FieldKind::Multiselect
        )
    }
}

/// A selectable option, written either as a bare string or as `{ value, label }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldOption {
    Plain(String),
    Labeled { value: String, label: String },
}

impl FieldOption {
    pub fn value(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { value, .. } => value,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { label, .. } => label,
        }
    }
}

/// Legacy equality gate: the field is shown only while `field_id` equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDependency {
    pub field_id: String,
    pub value: Value,
}

/// Value constraints checked when the step is submitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Name of a rule registered in [`crate::validate::CustomRules`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    /// Overrides the default message of any failing rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: String,
    /// Step group this field belongs to.
    pub group: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<FieldDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_if: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    /// Shape of one entry for composite kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_fields: Vec<FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, group: impl Into<String>, kind: FieldKind) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            group: group.into(),
            kind,
            required: false,
            placeholder: None,
            help_text: None,
            options: Vec::new(),
            dependencies: Vec::new(),
            show_if: None,
            validation: None,
            entry_fields: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options
            .into_iter()
            .map(|option| FieldOption::Plain(option.into()))
            .collect();
        self
    }

    pub fn depends_on(mut self, field_id: impl Into<String>, value: Value) -> Self {
        self.dependencies.push(FieldDependency {
            field_id: field_id.into(),
            value,
        });
        self
    }

    pub fn show_if(mut self, condition: Condition) -> Self {
        self.show_if = Some(condition);
        self
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_entry_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.entry_fields = fields;
        self
    }

    pub fn option_values(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(FieldOption::value)
    }
}
