mod journal;
mod wizard;

use clap::{Parser, Subcommand, ValueEnum};
use journal::JsonlPersister;
use serde_json::{Number, Value, json};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use visa_spec::spec::{FieldDefinition, FieldKind};
use visa_spec::{
    AnswerRecord, CustomRules, Debouncer, DocumentScope, FormDefinition, RenderPayload,
    StepOutcome, Submission, SubmissionSink, SubmitError, ValidationReport, VisibilityMode,
    Wizard, WizardStatus, build_render_payload, render_json_ui, resolve_documents,
    submission_document_ids, validate_form, visible_field_ids, visible_steps,
};
use wizard::{AnswerParseError, PromptContext, Verbosity, WizardPresenter};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEFAULT_LOG_FILTER: &str = "visa_spec=info,visa_wizard=info";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Text-based visa questionnaire wizard",
    long_about = "Runs visa questionnaire definitions as a step-by-step wizard and exposes the resolved views of an answer file"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Walk through a form definition in a text shell.
    Wizard {
        /// Path to the form definition JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Optional JSON file containing answers collected earlier.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Slug of the step to open first.
        #[arg(long, value_name = "SLUG")]
        step: Option<String>,
        /// Append every edited answer to this JSONL file after the debounce interval.
        #[arg(long, value_name = "FILE")]
        persist_log: Option<PathBuf>,
        /// Debounce interval for persisted answers (defaults to the form policy).
        #[arg(long, env = "VISA_WIZARD_DEBOUNCE_MS", value_name = "MS")]
        debounce_ms: Option<u64>,
        /// Show verbose output (progress, visible fields, parse expectations).
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Also emit answer JSON after submission.
        #[arg(long)]
        answers_json: bool,
        /// Render output mode for each step.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Print the visible steps, fields and documents for an answer file.
    Resolve {
        /// Path to the form definition JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Path to the answers JSON file.
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Validate answers against every visible field of a form.
    Validate {
        /// Path to the form definition JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Path to the answers JSON file.
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Print the JSON Schema of form definitions.
    Schema,
}

struct WizardOptions {
    form: PathBuf,
    answers: Option<PathBuf>,
    step: Option<String>,
    persist_log: Option<PathBuf>,
    debounce_ms: Option<u64>,
    verbose: bool,
    answers_json: bool,
    format: RenderMode,
}

fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Wizard {
            form,
            answers,
            step,
            persist_log,
            debounce_ms,
            verbose,
            answers_json,
            format,
        } => run_wizard(WizardOptions {
            form,
            answers,
            step,
            persist_log,
            debounce_ms,
            verbose,
            answers_json,
            format,
        }),
        Command::Resolve { form, answers } => run_resolve(form, answers),
        Command::Validate { form, answers } => run_validate(form, answers),
        Command::Schema => run_schema(),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_form(path: &Path) -> CliResult<FormDefinition> {
    let contents = fs::read_to_string(path)?;
    Ok(FormDefinition::from_json_str(&contents)?)
}

fn load_answers(path: Option<&Path>) -> CliResult<AnswerRecord> {
    let Some(path) = path else {
        return Ok(AnswerRecord::new());
    };
    let contents = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&contents)? {
        value @ Value::Object(_) => Ok(AnswerRecord::from_value(value)),
        _ => Err(format!("answers file '{}' must hold a JSON object", path.display()).into()),
    }
}

fn run_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(FormDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_resolve(form_path: PathBuf, answers_path: PathBuf) -> CliResult<()> {
    let form = load_form(&form_path)?;
    let answers = load_answers(Some(&answers_path))?;
    let mode = form.policy.malformed_conditions;
    println!("{}", serde_json::to_string_pretty(&resolve_views(&form, &answers, mode))?);
    Ok(())
}

fn resolve_views(form: &FormDefinition, answers: &AnswerRecord, mode: VisibilityMode) -> Value {
    let steps = visible_steps(&form.steps, answers, mode)
        .into_iter()
        .map(|step| step.slug.as_str())
        .collect::<Vec<_>>();
    let fields = visible_field_ids(&form.fields, answers, mode);
    let display = resolve_documents(&form.documents, answers, DocumentScope::Display)
        .into_iter()
        .map(|document| document.id.as_str())
        .collect::<Vec<_>>();
    json!({
        "formId": form.id,
        "visibleSteps": steps,
        "visibleFields": fields,
        "displayDocuments": display,
        "submissionDocuments": submission_document_ids(&form.documents, answers),
    })
}

fn run_validate(form_path: PathBuf, answers_path: PathBuf) -> CliResult<()> {
    let form = load_form(&form_path)?;
    let answers = load_answers(Some(&answers_path))?;

    let report = validate_form(&form, &answers, &CustomRules::new());
    println!(
        "Validation result: {}",
        if report.valid { "valid" } else { "invalid" }
    );
    describe_validation(&report);

    if report.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(report: &ValidationReport) {
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  {} - {}", error.path, error.message);
        }
    }
    if !report.missing_required.is_empty() {
        println!(
            "Missing required answers: {}",
            report.missing_required.join(", ")
        );
    }
}

/// Keeps the submission so the completion screen can print it.
#[derive(Default)]
struct CaptureSink {
    submission: Option<Submission>,
}

impl SubmissionSink for CaptureSink {
    fn submit(&mut self, submission: &Submission) -> Result<(), SubmitError> {
        self.submission = Some(submission.clone());
        Ok(())
    }
}

/// What the user asked for while a step was on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepAction {
    Submit,
    Back,
    /// One-based step position.
    GoTo(usize),
    /// Visibility moved the wizard to another step while answering.
    Redraw,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldInput {
    Value(Value),
    Keep,
    Navigate(StepAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Navigate(StepAction),
    Exit,
}

fn run_wizard(options: WizardOptions) -> CliResult<()> {
    let form = Arc::new(load_form(&options.form)?);
    let answers = load_answers(options.answers.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    let mut wizard = Wizard::new(Arc::clone(&form), answers, CaptureSink::default())
        .open_at(options.step.as_deref());
    if let Some(path) = &options.persist_log {
        let delay = options
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| form.policy.persist_debounce());
        let persister = Arc::new(JsonlPersister::new(path));
        tracing::debug!(path = %persister.path().display(), ?delay, "persisting answers");
        let debouncer = Debouncer::new(persister, delay)?;
        wizard = wizard.with_persistence(debouncer);
    }

    let mut presenter =
        WizardPresenter::new(Verbosity::from_verbose(options.verbose), options.answers_json);
    drive(&mut wizard, &mut presenter, options.format)?;

    if let Some(debouncer) = wizard.persistence() {
        runtime.block_on(debouncer.flush());
    }
    if let Some(submission) = &wizard.sink().submission {
        presenter.show_completion(submission);
    }
    Ok(())
}

fn drive(
    wizard: &mut Wizard<CaptureSink>,
    presenter: &mut WizardPresenter,
    format: RenderMode,
) -> CliResult<()> {
    loop {
        let payload = build_render_payload(wizard);
        presenter.show_header(&payload);
        match payload.status {
            WizardStatus::Submitted => return Ok(()),
            WizardStatus::NoApplicableSteps => {
                println!("No applicable steps for the current answers.");
                return Err("no steps apply to the current answers".into());
            }
            WizardStatus::InProgress => {}
        }
        print_render_output(format, &payload)?;
        presenter.show_step(&payload);

        match prompt_step(wizard, presenter)? {
            StepAction::Submit => {
                if let StepOutcome::Rejected {
                    document_upload_error,
                    ..
                } = wizard.submit_step(&AnswerRecord::new())?
                {
                    presenter.show_rejection(&wizard.blocking_errors(), document_upload_error);
                }
            }
            StepAction::Back => {
                wizard.back();
            }
            StepAction::GoTo(position) => {
                if let Err(err) = wizard.go_to(position.saturating_sub(1)) {
                    println!("Cannot open step {}: {}", position, err);
                }
            }
            StepAction::Redraw => {}
        }
    }
}

/// Prompts every visible field of the current step in order. Fields revealed by an
/// answer are picked up as they appear.
fn prompt_step(
    wizard: &mut Wizard<CaptureSink>,
    presenter: &WizardPresenter,
) -> CliResult<StepAction> {
    let slug = current_slug(wizard);
    let mut asked = BTreeSet::new();

    loop {
        let fields = wizard.current_fields();
        let total = fields.len();
        let next = fields
            .iter()
            .enumerate()
            .find(|(_, field)| !asked.contains(&field.id))
            .map(|(position, field)| (position, (*field).clone()));
        let Some((position, field)) = next else {
            break;
        };

        let current = wizard.answers().get(&field.id).cloned();
        let prompt = PromptContext::new(&field, position + 1, total, current.as_ref());
        match prompt_field(&prompt, &field, current.as_ref(), presenter)? {
            FieldInput::Value(value) => wizard.set_answer(&field.id, value),
            FieldInput::Keep => {}
            FieldInput::Navigate(action) => return Ok(action),
        }
        asked.insert(field.id);

        if current_slug(wizard) != slug {
            return Ok(StepAction::Redraw);
        }
    }

    if asked.is_empty() {
        loop {
            presenter.show_confirmation();
            let raw = read_input()?;
            match parse_control(&raw) {
                Ok(Some(Control::Exit)) => return Err("wizard aborted by user".into()),
                Ok(Some(Control::Navigate(action))) => return Ok(action),
                Ok(None) => break,
                Err(err) => presenter.show_parse_error(&err),
            }
        }
    }
    Ok(StepAction::Submit)
}

fn current_slug(wizard: &Wizard<CaptureSink>) -> Option<String> {
    wizard.current_step().map(|step| step.slug.clone())
}

fn prompt_field(
    prompt: &PromptContext,
    field: &FieldDefinition,
    current: Option<&Value>,
    presenter: &WizardPresenter,
) -> CliResult<FieldInput> {
    loop {
        presenter.show_prompt(prompt);
        let raw = read_input()?;
        match parse_control(&raw) {
            Ok(Some(Control::Exit)) => return Err("wizard aborted by user".into()),
            Ok(Some(Control::Navigate(action))) => return Ok(FieldInput::Navigate(action)),
            Ok(None) => {}
            Err(err) => {
                presenter.show_parse_error(&err);
                continue;
            }
        }

        match parse_answer(field, &raw, current) {
            Ok(Some(value)) => return Ok(FieldInput::Value(value)),
            Ok(None) => return Ok(FieldInput::Keep),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

fn read_input() -> CliResult<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err("input closed before the wizard finished".into());
    }
    Ok(input.trim().to_string())
}

fn parse_control(raw: &str) -> Result<Option<Control>, AnswerParseError> {
    if raw.eq_ignore_ascii_case("exit") {
        return Ok(Some(Control::Exit));
    }
    let Some(command) = raw.strip_prefix(':') else {
        return Ok(None);
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("back"), None, None) => Ok(Some(Control::Navigate(StepAction::Back))),
        (Some("goto"), Some(position), None) => match position.parse::<usize>() {
            Ok(position) if position > 0 => {
                Ok(Some(Control::Navigate(StepAction::GoTo(position))))
            }
            _ => Err(AnswerParseError::new(
                "Step positions start at 1.",
                Some(format!("got '{}'", position)),
            )),
        },
        _ => Err(AnswerParseError::new(
            format!("Unknown command '{}'.", raw),
            Some("commands: :back, :goto N, exit".to_string()),
        )),
    }
}

/// `Ok(None)` keeps the stored answer (or leaves an optional field unanswered).
fn parse_answer(
    field: &FieldDefinition,
    raw: &str,
    current: Option<&Value>,
) -> Result<Option<Value>, AnswerParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        if current.is_none() && field.required {
            return Err(AnswerParseError::new(
                "This question requires an answer.",
                None,
            ));
        }
        return Ok(None);
    }

    let value = match field.kind {
        FieldKind::Checkbox => parse_boolean(raw)?,
        FieldKind::Number => parse_number(raw)?,
        FieldKind::Select | FieldKind::Radio | FieldKind::Country if !field.options.is_empty() => {
            parse_choice(field, raw)?
        }
        FieldKind::Multiselect => parse_multiselect(field, raw)?,
        FieldKind::Dependents | FieldKind::Itinerary => parse_entries(field, raw)?,
        _ => Value::String(raw.to_string()),
    };
    Ok(Some(value))
}

fn parse_boolean(raw: &str) -> Result<Value, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
        "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
        _ => Err(AnswerParseError::new(
            "Please enter yes or no.",
            Some("expected boolean (y/n/true/false)".to_string()),
        )),
    }
}

fn parse_number(raw: &str) -> Result<Value, AnswerParseError> {
    if let Ok(integer) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(integer)));
    }
    raw.parse::<f64>()
        .map_err(|_| {
            AnswerParseError::new(
                "Please enter a number.",
                Some("expected number".to_string()),
            )
        })
        .and_then(|value| {
            Number::from_f64(value).map(Value::Number).ok_or_else(|| {
                AnswerParseError::new(
                    "Please enter a finite number.",
                    Some("number must be finite".to_string()),
                )
            })
        })
}

fn find_choice<'a>(field: &'a FieldDefinition, raw: &str) -> Option<&'a str> {
    field
        .option_values()
        .find(|choice| choice.eq_ignore_ascii_case(raw))
}

fn choices_error(field: &FieldDefinition) -> AnswerParseError {
    let allowed = field.option_values().collect::<Vec<_>>().join(", ");
    AnswerParseError::new(
        format!("Choose one of: {}.", allowed),
        Some(format!("allowed values: {}", allowed)),
    )
}

fn parse_choice(field: &FieldDefinition, raw: &str) -> Result<Value, AnswerParseError> {
    find_choice(field, raw)
        .map(|choice| Value::String(choice.to_string()))
        .ok_or_else(|| choices_error(field))
}

fn parse_multiselect(field: &FieldDefinition, raw: &str) -> Result<Value, AnswerParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            if field.options.is_empty() {
                Ok(Value::String(item.to_string()))
            } else {
                find_choice(field, item)
                    .map(|choice| Value::String(choice.to_string()))
                    .ok_or_else(|| choices_error(field))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn parse_entries(field: &FieldDefinition, raw: &str) -> Result<Value, AnswerParseError> {
    let expected = field
        .entry_fields
        .iter()
        .map(|entry| entry.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) if entries.iter().all(Value::is_object) => {
            Ok(Value::Array(entries))
        }
        Ok(_) => Err(AnswerParseError::new(
            "Entries must be a JSON array of objects.",
            Some(format!("expected array of objects with [{}]", expected)),
        )),
        Err(err) => Err(AnswerParseError::new(
            "Invalid entries; provide a JSON array (e.g. [{\"name\": \"value\"}]).",
            Some(err.to_string()),
        )),
    }
}

fn print_render_output(mode: RenderMode, payload: &RenderPayload) -> CliResult<()> {
    match mode {
        RenderMode::Text => Ok(()),
        RenderMode::Json => {
            println!(
                "JSON UI:\n{}",
                serde_json::to_string_pretty(&render_json_ui(payload))?
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(kind: FieldKind) -> FieldDefinition {
        FieldDefinition::new("answer", "step", kind)
    }

    #[test]
    fn parse_answer_checkbox_accepts_yes() {
        let checkbox = field(FieldKind::Checkbox).required();
        assert_eq!(
            parse_answer(&checkbox, "yes", None).unwrap(),
            Some(Value::Bool(true))
        );
        assert!(parse_answer(&checkbox, "maybe", None).is_err());
    }

    #[test]
    fn parse_answer_number_prefers_integers() {
        let number = field(FieldKind::Number);
        assert_eq!(parse_answer(&number, "42", None).unwrap(), Some(json!(42)));
        assert_eq!(parse_answer(&number, "2.5", None).unwrap(), Some(json!(2.5)));
        assert!(parse_answer(&number, "many", None).is_err());
    }

    #[test]
    fn parse_answer_select_checks_options() {
        let select = field(FieldKind::Select).with_options(["tourism", "business"]);
        assert!(parse_answer(&select, "study", None).is_err());
        assert_eq!(
            parse_answer(&select, "Business", None).unwrap(),
            Some(json!("business"))
        );
    }

    #[test]
    fn parse_answer_country_without_options_is_free_text() {
        let country = field(FieldKind::Country);
        assert_eq!(parse_answer(&country, "PT", None).unwrap(), Some(json!("PT")));
    }

    #[test]
    fn parse_answer_multiselect_splits_on_commas() {
        let multi = field(FieldKind::Multiselect).with_options(["hotel", "flight", "car"]);
        assert_eq!(
            parse_answer(&multi, "hotel, Car", None).unwrap(),
            Some(json!(["hotel", "car"]))
        );
        assert!(parse_answer(&multi, "hotel, boat", None).is_err());
    }

    #[test]
    fn parse_answer_entries_require_objects() {
        let children = field(FieldKind::Dependents)
            .with_entry_fields(vec![FieldDefinition::new("name", "step", FieldKind::Text)]);
        let value = parse_answer(&children, r#"[{"name": "Mia"}]"#, None).unwrap();
        assert_eq!(value, Some(json!([{ "name": "Mia" }])));
        assert!(parse_answer(&children, r#"{"name": "Mia"}"#, None).is_err());
        assert!(parse_answer(&children, r#"["Mia"]"#, None).is_err());
    }

    #[test]
    fn empty_input_keeps_current_or_requires_answer() {
        let required = field(FieldKind::Text).required();
        assert!(parse_answer(&required, "", None).is_err());
        assert_eq!(parse_answer(&required, "", Some(&json!("Ana"))).unwrap(), None);
        assert_eq!(parse_answer(&field(FieldKind::Text), "  ", None).unwrap(), None);
    }

    #[test]
    fn control_commands_are_recognized() {
        assert_eq!(parse_control("EXIT").unwrap(), Some(Control::Exit));
        assert_eq!(
            parse_control(":back").unwrap(),
            Some(Control::Navigate(StepAction::Back))
        );
        assert_eq!(
            parse_control(":goto 3").unwrap(),
            Some(Control::Navigate(StepAction::GoTo(3)))
        );
        assert!(parse_control(":goto 0").is_err());
        assert!(parse_control(":skip").is_err());
        assert_eq!(parse_control("Lisbon").unwrap(), None);
    }

    #[test]
    fn resolve_views_reports_both_document_scopes() {
        let form = FormDefinition::from_json_str(include_str!("../tests/fixtures/visa_form.json"))
            .expect("fixture parses");
        let answers = AnswerRecord::from_value(json!({ "purpose": "business" }));
        let views = resolve_views(&form, &answers, VisibilityMode::Visible);
        assert_eq!(views["visibleSteps"], json!(["applicant", "trip", "documents"]));
        assert_eq!(views["displayDocuments"], json!(["passport", "invitation"]));
        assert_eq!(views["submissionDocuments"], json!(["passport", "invitation"]));
        assert!(
            views["visibleFields"]
                .as_array()
                .expect("field list")
                .contains(&json!("companyName"))
        );
    }
}
