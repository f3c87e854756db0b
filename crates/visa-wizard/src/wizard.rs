use serde_json::Value;
use visa_spec::render::value_to_display;
use visa_spec::spec::{FieldDefinition, FieldKind};
use visa_spec::{ErrorMap, RenderPayload, Submission};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: step titles and field prompts only.
    Clean,
    /// Verbose output: progress, visible fields, parse expectations, choices.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints step headers, prompts and outcomes for the interactive shell.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_answers_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_answers_json,
        }
    }

    pub fn show_header(&mut self, payload: &RenderPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_title);
        if self.verbosity.is_verbose() {
            println!("Form id: {}", payload.form_id);
        }
        self.header_printed = true;
    }

    pub fn show_step(&self, payload: &RenderPayload) {
        let Some(step) = &payload.step else {
            return;
        };
        println!(
            "Step {}/{}: {}{}",
            step.index + 1,
            step.total,
            step.title,
            if step.completed { " (completed)" } else { "" }
        );
        if let Some(description) = &step.description {
            println!("{}", description);
        }
        if self.verbosity.is_verbose() {
            println!(
                "Status: {} ({}/{} steps completed)",
                payload.status.as_str(),
                payload.progress.completed,
                payload.progress.total
            );
            println!("Visible fields:");
            for field in &payload.fields {
                let mut entry = format!(" - {} ({})", field.id, field.label);
                if field.required {
                    entry.push_str(" [required]");
                }
                println!("{}", entry);
            }
        }
        if !payload.documents.is_empty() {
            println!("Documents to upload:");
            for document in &payload.documents {
                println!(" - {} ({})", document.name, document.id);
            }
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.label);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        if let Some(current) = &prompt.current {
            line.push_str(&format!(" [{}]", current));
        }
        println!("{}", line);
        if let Some(help) = &prompt.help_text {
            println!("{}", help);
        }
        if !prompt.entry_fields.is_empty() {
            println!("Entry fields: {}", prompt.entry_fields.join(", "));
        }
        if self.verbosity.is_verbose() && !prompt.choices.is_empty() {
            println!("Choices: {}", prompt.choices.join(", "));
        }
    }

    pub fn show_confirmation(&self) {
        println!("Press Enter to continue (:back, :goto N, exit)");
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_rejection(&self, errors: &ErrorMap, document_upload_error: bool) {
        println!("Step not accepted:");
        for (path, error) in errors {
            println!("  {} - {}", path, error.message);
        }
        if document_upload_error {
            println!("  documents - an upload failed");
        }
    }

    pub fn show_completion(&self, submission: &Submission) {
        println!("Submitted ✅");
        if !submission.documents.is_empty() {
            println!("Documents: {}", submission.documents.join(", "));
        }
        match submission.answers.to_cbor() {
            Ok(bytes) => println!("Answers (CBOR hex): {}", encode_hex(&bytes)),
            Err(err) => eprintln!("Failed to serialize answers to CBOR: {}", err),
        }
        if self.show_answers_json {
            match submission.answers.to_json_pretty() {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single field prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub label: String,
    pub help_text: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
    pub current: Option<String>,
    pub entry_fields: Vec<String>,
}

impl PromptContext {
    pub fn new(field: &FieldDefinition, index: usize, total: usize, current: Option<&Value>) -> Self {
        let choices = field.option_values().map(String::from).collect::<Vec<_>>();
        Self {
            index: index.max(1),
            total,
            label: field.label.clone(),
            help_text: field.help_text.clone(),
            required: field.required,
            hint: hint(field.kind, &choices),
            choices,
            current: current.map(value_to_display),
            entry_fields: field
                .entry_fields
                .iter()
                .map(|entry| entry.id.clone())
                .collect(),
        }
    }
}

fn hint(kind: FieldKind, choices: &[String]) -> Option<String> {
    match kind {
        FieldKind::Checkbox => Some("(yes/no, y/n, true/false)".to_string()),
        FieldKind::Number => Some("(number)".to_string()),
        FieldKind::Date => Some("(YYYY-MM-DD)".to_string()),
        FieldKind::Email => Some("(email)".to_string()),
        FieldKind::Multiselect if !choices.is_empty() => {
            Some(format!("(comma separated: {})", choices.join("/")))
        }
        FieldKind::Select | FieldKind::Radio | FieldKind::Country if !choices.is_empty() => {
            Some(format!("({})", choices.join("/")))
        }
        FieldKind::Dependents | FieldKind::Itinerary => Some("(JSON array of entries)".to_string()),
        _ => None,
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_lists_choices_and_current_value() {
        let field = FieldDefinition::new("purpose", "trip", FieldKind::Select)
            .required()
            .with_label("Purpose of visit")
            .with_options(["tourism", "business"]);
        let prompt = PromptContext::new(&field, 2, 3, Some(&json!("tourism")));
        assert_eq!(prompt.hint.as_deref(), Some("(tourism/business)"));
        assert_eq!(prompt.current.as_deref(), Some("tourism"));
        assert!(prompt.required);
        assert_eq!(prompt.index, 2);
    }

    #[test]
    fn composite_prompt_names_entry_fields() {
        let field = FieldDefinition::new("children", "family", FieldKind::Dependents)
            .with_entry_fields(vec![
                FieldDefinition::new("name", "family", FieldKind::Text),
                FieldDefinition::new("birthDate", "family", FieldKind::Date),
            ]);
        let prompt = PromptContext::new(&field, 0, 1, None);
        assert_eq!(prompt.index, 1);
        assert_eq!(prompt.entry_fields, vec!["name", "birthDate"]);
        assert_eq!(prompt.hint.as_deref(), Some("(JSON array of entries)"));
    }

    #[test]
    fn hex_encoding_is_lowercase_pairs() {
        assert_eq!(encode_hex(&[0x00, 0xab, 0x10]), "00ab10");
    }
}
