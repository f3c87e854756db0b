use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::answers::{AnswerRecord, ValidationError, ValidationReport};
use crate::condition::VisibilityMode;
use crate::spec::field::{FieldDefinition, FieldKind, FieldValidation};
use crate::spec::form::FormDefinition;
use crate::steps::visible_steps;
use crate::visibility::{is_field_visible, step_fields};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

const DATE_FORMAT: &str = "%Y-%m-%d";

pub type CustomRule = Box<dyn Fn(&Value, &AnswerRecord) -> Result<(), String> + Send + Sync>;

/// Named predicates referenced by `validation.custom` in field definitions.
#[derive(Default)]
pub struct CustomRules {
    rules: HashMap<String, CustomRule>,
}

impl CustomRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value, &AnswerRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register(name, rule);
        self
    }

    pub fn register<F>(&mut self, name: impl Into<String>, rule: F)
    where
        F: Fn(&Value, &AnswerRecord) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), Box::new(rule));
    }

    pub fn get(&self, name: &str) -> Option<&CustomRule> {
        self.rules.get(name)
    }
}

impl fmt::Debug for CustomRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.rules.keys().collect();
        names.sort();
        f.debug_struct("CustomRules").field("rules", &names).finish()
    }
}

/// Validates the given (already visibility-filtered) fields against `answers`.
pub fn validate_fields(
    fields: &[&FieldDefinition],
    answers: &AnswerRecord,
    rules: &CustomRules,
) -> ValidationReport {
    validate_fields_with(fields, answers, rules, VisibilityMode::default())
}

/// Like [`validate_fields`], resolving composite entry fields with `mode`.
pub fn validate_fields_with(
    fields: &[&FieldDefinition],
    answers: &AnswerRecord,
    rules: &CustomRules,
    mode: VisibilityMode,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for field in fields {
        match answers.get(&field.id) {
            None => {
                if field.required {
                    missing_required.push(field.id.clone());
                }
            }
            Some(value) => {
                let ctx = FieldContext {
                    owner: &field.id,
                    path: field.id.clone(),
                    answers,
                    rules,
                    mode,
                };
                validate_value(field, value, &ctx, &mut errors);
            }
        }
    }

    ValidationReport {
        valid: errors.is_empty() && missing_required.is_empty(),
        errors,
        missing_required,
    }
}

/// Validates every visible field of every visible step.
pub fn validate_form(
    form: &FormDefinition,
    answers: &AnswerRecord,
    rules: &CustomRules,
) -> ValidationReport {
    let mode = form.policy.malformed_conditions;
    let fields: Vec<&FieldDefinition> = visible_steps(&form.steps, answers, mode)
        .into_iter()
        .flat_map(|step| step_fields(&form.fields, &step.group, answers, mode))
        .collect();
    validate_fields_with(&fields, answers, rules, mode)
}

struct FieldContext<'a> {
    /// Top-level field the error is reported against.
    owner: &'a str,
    path: String,
    answers: &'a AnswerRecord,
    rules: &'a CustomRules,
    mode: VisibilityMode,
}

impl FieldContext<'_> {
    fn error(&self, field: &FieldDefinition, message: &str, code: &str) -> ValidationError {
        let message = field
            .validation
            .as_ref()
            .and_then(|validation| validation.message.as_deref())
            .unwrap_or(message);
        ValidationError::new(self.owner, self.path.clone(), message, code)
    }
}

fn validate_value(
    field: &FieldDefinition,
    value: &Value,
    ctx: &FieldContext<'_>,
    errors: &mut Vec<ValidationError>,
) {
    if is_blank(value) {
        if field.required {
            errors.push(ctx.error(field, "this field cannot be empty", "empty"));
        }
        return;
    }

    if let Some(error) = check_kind(field, value, ctx) {
        errors.push(error);
        return;
    }

    if field.kind.has_options()
        && !field.options.is_empty()
        && let Some(error) = check_options(field, value, ctx)
    {
        errors.push(error);
        return;
    }

    if let Some(validation) = &field.validation
        && let Some(error) = enforce_validation(field, value, validation, ctx)
    {
        errors.push(error);
        return;
    }

    if field.kind.is_composite() {
        validate_entries(field, value, ctx, errors);
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_kind(
    field: &FieldDefinition,
    value: &Value,
    ctx: &FieldContext<'_>,
) -> Option<ValidationError> {
    let matches = match field.kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Tel
        | FieldKind::Country
        | FieldKind::Select
        | FieldKind::Radio => value.is_string(),
        FieldKind::Email => {
            return match value.as_str() {
                Some(text) if EMAIL.is_match(text.trim()) => None,
                Some(_) => Some(ctx.error(field, "enter a valid email address", "invalid_email")),
                None => Some(ctx.error(field, "type mismatch", "type_mismatch")),
            };
        }
        FieldKind::Date => {
            return match value.as_str() {
                Some(text) if NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).is_ok() => None,
                Some(_) => Some(ctx.error(field, "enter a date as YYYY-MM-DD", "invalid_date")),
                None => Some(ctx.error(field, "type mismatch", "type_mismatch")),
            };
        }
        FieldKind::Number => numeric_value(value).is_some(),
        FieldKind::Checkbox => value.is_boolean(),
        FieldKind::Multiselect => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        FieldKind::Dependents | FieldKind::Itinerary => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_object)),
    };

    if matches {
        None
    } else {
        Some(ctx.error(field, "type mismatch", "type_mismatch"))
    }
}

fn check_options(
    field: &FieldDefinition,
    value: &Value,
    ctx: &FieldContext<'_>,
) -> Option<ValidationError> {
    let allowed = |candidate: &str| field.option_values().any(|option| option == candidate);
    let valid = match value {
        Value::String(text) => allowed(text),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .all(|item| allowed(item)),
        _ => false,
    };
    if valid {
        None
    } else {
        Some(ctx.error(field, "invalid option", "invalid_option"))
    }
}

fn enforce_validation(
    field: &FieldDefinition,
    value: &Value,
    validation: &FieldValidation,
    ctx: &FieldContext<'_>,
) -> Option<ValidationError> {
    if let Some(pattern) = &validation.pattern
        && let Some(text) = value.as_str()
    {
        match Regex::new(pattern) {
            Ok(regex) if !regex.is_match(text) => {
                return Some(ctx.error(field, "value does not match pattern", "pattern_mismatch"));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(field = %field.id, %err, "ignoring invalid validation pattern");
            }
        }
    }

    if let Some(min_len) = validation.min_length
        && let Some(text) = value.as_str()
        && text.chars().count() < min_len
    {
        return Some(ctx.error(field, "text shorter than min length", "min_length"));
    }

    if let Some(max_len) = validation.max_length
        && let Some(text) = value.as_str()
        && text.chars().count() > max_len
    {
        return Some(ctx.error(field, "text longer than max length", "max_length"));
    }

    if let Some(min) = validation.min
        && let Some(number) = numeric_value(value)
        && number < min
    {
        return Some(ctx.error(field, "value below minimum", "min"));
    }

    if let Some(max) = validation.max
        && let Some(number) = numeric_value(value)
        && number > max
    {
        return Some(ctx.error(field, "value above maximum", "max"));
    }

    if let Some(name) = &validation.custom {
        match ctx.rules.get(name) {
            Some(rule) => {
                if let Err(message) = rule(value, ctx.answers) {
                    let message = validation.message.clone().unwrap_or(message);
                    return Some(ValidationError::new(
                        ctx.owner,
                        ctx.path.clone(),
                        message,
                        "custom",
                    ));
                }
            }
            None => tracing::warn!(field = %field.id, rule = %name, "unknown custom rule"),
        }
    }

    None
}

fn validate_entries(
    field: &FieldDefinition,
    value: &Value,
    ctx: &FieldContext<'_>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(entries) = value.as_array() else {
        return;
    };

    for (index, entry) in entries.iter().enumerate() {
        let record = AnswerRecord::from_value(entry.clone());
        for sub_field in &field.entry_fields {
            if !is_field_visible(sub_field, &record, ctx.mode) {
                continue;
            }
            let sub_ctx = FieldContext {
                owner: ctx.owner,
                path: format!("{}[{}].{}", ctx.path, index, sub_field.id),
                answers: ctx.answers,
                rules: ctx.rules,
                mode: ctx.mode,
            };
            match record.get(&sub_field.id) {
                None if sub_field.required => errors.push(sub_ctx.error(
                    sub_field,
                    "this field is required",
                    "missing_required",
                )),
                None => {}
                Some(sub_value) => validate_value(sub_field, sub_value, &sub_ctx, errors),
            }
        }
    }
}

/// Numbers, or strings that parse as numbers (form inputs often submit text).
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}
