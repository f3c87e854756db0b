use serde_json::{Map, Value, json};

use crate::spec::field::{FieldKind, FieldOption};
use crate::wizard::{SubmissionSink, Wizard, WizardStatus, WizardView};

/// Progress counters exposed to renderers.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenderStep {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub show_documents: bool,
    pub completed: bool,
    pub is_last: bool,
}

/// Describes a single visible field for render outputs.
#[derive(Debug, Clone)]
pub struct RenderField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub help_text: Option<String>,
    pub placeholder: Option<String>,
    pub options: Vec<FieldOption>,
    pub current_value: Option<Value>,
    /// `path: message` pairs; composite fields may carry several.
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RenderDocument {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Snapshot of the wizard used by both the text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_title: String,
    pub status: WizardStatus,
    pub step: Option<RenderStep>,
    pub progress: RenderProgress,
    pub fields: Vec<RenderField>,
    pub documents: Vec<RenderDocument>,
}

pub fn build_render_payload<S: SubmissionSink>(wizard: &Wizard<S>) -> RenderPayload {
    let form = wizard.form();
    let mut payload = RenderPayload {
        form_id: form.id.clone(),
        form_title: form.title.clone(),
        status: wizard.status(),
        step: None,
        progress: RenderProgress {
            completed: wizard.completed().len(),
            total: wizard.visible_steps().len(),
        },
        fields: Vec::new(),
        documents: Vec::new(),
    };

    let WizardView::Step(view) = wizard.view() else {
        return payload;
    };

    payload.step = Some(RenderStep {
        index: view.index,
        total: view.total,
        title: view.step.title.clone(),
        slug: view.step.slug.clone(),
        description: view.step.description.clone(),
        show_documents: view.step.show_documents,
        completed: view.completed,
        is_last: view.is_last,
    });

    payload.fields = view
        .fields
        .iter()
        .map(|field| RenderField {
            id: field.id.clone(),
            label: field.label.clone(),
            kind: field.kind,
            required: field.required,
            help_text: field.help_text.clone(),
            placeholder: field.placeholder.clone(),
            options: field.options.clone(),
            current_value: wizard.answers().get(&field.id).cloned(),
            errors: view
                .errors
                .values()
                .filter(|error| error.field_id == field.id)
                .map(|error| (error.path.clone(), error.message.clone()))
                .collect(),
        })
        .collect();

    payload.documents = view
        .documents
        .iter()
        .map(|document| RenderDocument {
            id: document.id.clone(),
            name: document.name.clone(),
            description: document.description.clone(),
        })
        .collect();

    payload
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(field.id.clone()));
            map.insert("label".into(), Value::String(field.label.clone()));
            map.insert("type".into(), Value::String(field.kind.as_str().into()));
            map.insert("required".into(), Value::Bool(field.required));
            if let Some(help) = &field.help_text {
                map.insert("helpText".into(), Value::String(help.clone()));
            }
            if let Some(placeholder) = &field.placeholder {
                map.insert("placeholder".into(), Value::String(placeholder.clone()));
            }
            if !field.options.is_empty() {
                let options = field
                    .options
                    .iter()
                    .map(|option| json!({ "value": option.value(), "label": option.label() }))
                    .collect();
                map.insert("options".into(), Value::Array(options));
            }
            if let Some(value) = &field.current_value {
                map.insert("value".into(), value.clone());
            }
            if !field.errors.is_empty() {
                let errors = field
                    .errors
                    .iter()
                    .map(|(path, message)| json!({ "path": path, "message": message }))
                    .collect();
                map.insert("errors".into(), Value::Array(errors));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let documents = payload
        .documents
        .iter()
        .map(|document| {
            json!({
                "id": document.id,
                "name": document.name,
                "description": document.description,
            })
        })
        .collect::<Vec<_>>();

    let step = payload.step.as_ref().map(|step| {
        json!({
            "index": step.index,
            "total": step.total,
            "title": step.title,
            "slug": step.slug,
            "description": step.description,
            "showDocuments": step.show_documents,
            "completed": step.completed,
            "isLast": step.is_last,
        })
    });

    json!({
        "formId": payload.form_id,
        "formTitle": payload.form_title,
        "status": payload.status.as_str(),
        "step": step,
        "progress": {
            "completed": payload.progress.completed,
            "total": payload.progress.total,
        },
        "fields": fields,
        "documents": documents,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_title, payload.form_id));

    match (&payload.status, &payload.step) {
        (WizardStatus::Submitted, _) => {
            lines.push("Application submitted.".to_string());
            return lines.join("\n");
        }
        (WizardStatus::NoApplicableSteps, _) | (_, None) => {
            lines.push("No applicable steps for the current answers.".to_string());
            return lines.join("\n");
        }
        (WizardStatus::InProgress, Some(step)) => {
            lines.push(format!(
                "Step {}/{}: {}{}",
                step.index + 1,
                step.total,
                step.title,
                if step.completed { " (completed)" } else { "" }
            ));
            if let Some(description) = &step.description {
                lines.push(description.clone());
            }
        }
    }

    if !payload.fields.is_empty() {
        lines.push("Fields:".to_string());
    }
    for field in &payload.fields {
        let mut entry = format!(" - {} ({})", field.id, field.label);
        if field.required {
            entry.push_str(" [required]");
        }
        if let Some(value) = &field.current_value {
            entry.push_str(&format!(" = {}", value_to_display(value)));
        }
        lines.push(entry);
        for (path, message) in &field.errors {
            lines.push(format!("     ! {}: {}", path, message));
        }
    }

    if !payload.documents.is_empty() {
        lines.push("Documents to upload:".to_string());
        for document in &payload.documents {
            lines.push(format!(" - {} ({})", document.name, document.id));
        }
    }

    lines.join("\n")
}

pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        Value::Array(items) if items.iter().all(|item| !item.is_object()) => items
            .iter()
            .map(value_to_display)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
