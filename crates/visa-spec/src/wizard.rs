//! Multi-step wizard over a [`FormDefinition`].
//!
//! The wizard is the single writer of the [`AnswerRecord`]. Every edit re-resolves the
//! visible steps and clamps the current index, so the index never points past the end
//! of the visible list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::answers::{AnswerRecord, ErrorMap};
use crate::condition::VisibilityMode;
use crate::documents::{display_documents, submission_document_ids};
use crate::persist::{Debouncer, PersistEntry};
use crate::spec::document::DocumentDefinition;
use crate::spec::field::FieldDefinition;
use crate::spec::form::FormDefinition;
use crate::spec::step::StepDefinition;
use crate::steps::{position_of_slug, visible_steps};
use crate::validate::{CustomRules, validate_fields};
use crate::visibility::{errors_for_visible, step_fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStatus {
    InProgress,
    /// Every step is filtered out by the current answers.
    NoApplicableSteps,
    Submitted,
}

impl WizardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStatus::InProgress => "in_progress",
            WizardStatus::NoApplicableSteps => "no_applicable_steps",
            WizardStatus::Submitted => "submitted",
        }
    }
}

/// Payload handed to the case-management system once the last step validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub form_id: String,
    pub answers: AnswerRecord,
    /// Required documents with every condition met.
    pub documents: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("submission io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait SubmissionSink {
    fn submit(&mut self, submission: &Submission) -> Result<(), SubmitError>;
}

impl<F> SubmissionSink for F
where
    F: FnMut(&Submission) -> Result<(), SubmitError>,
{
    fn submit(&mut self, submission: &Submission) -> Result<(), SubmitError> {
        self(submission)
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("no steps apply to the current answers")]
    NoApplicableSteps,
    #[error("the application was already submitted")]
    AlreadySubmitted,
    #[error("step {index} is out of range ({len} visible steps)")]
    StepOutOfRange { index: usize, len: usize },
    #[error("submission failed: {0}")]
    Submission(#[from] SubmitError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced { index: usize },
    Submitted,
    /// Nothing was merged; the step stays current.
    Rejected {
        errors: usize,
        document_upload_error: bool,
        subform_errors: bool,
    },
}

/// Render-ready snapshot of the current step.
#[derive(Debug)]
pub struct StepView<'a> {
    pub index: usize,
    pub total: usize,
    pub step: &'a StepDefinition,
    pub fields: Vec<&'a FieldDefinition>,
    /// Documents to upload on a document step; empty on field steps.
    pub documents: Vec<&'a DocumentDefinition>,
    pub errors: ErrorMap,
    pub completed: bool,
    pub is_last: bool,
}

#[derive(Debug)]
pub enum WizardView<'a> {
    Step(StepView<'a>),
    NoApplicableSteps,
    Submitted,
}

pub struct Wizard<S> {
    form: Arc<FormDefinition>,
    answers: AnswerRecord,
    current: usize,
    completed: BTreeSet<usize>,
    errors: ErrorMap,
    subform_errors: BTreeMap<String, bool>,
    document_upload_error: bool,
    status: WizardStatus,
    rules: CustomRules,
    persistence: Option<Debouncer>,
    sink: S,
}

impl<S: SubmissionSink> Wizard<S> {
    pub fn new(form: Arc<FormDefinition>, answers: AnswerRecord, sink: S) -> Self {
        let mut wizard = Self {
            form,
            answers,
            current: 0,
            completed: BTreeSet::new(),
            errors: ErrorMap::new(),
            subform_errors: BTreeMap::new(),
            document_upload_error: false,
            status: WizardStatus::InProgress,
            rules: CustomRules::new(),
            persistence: None,
            sink,
        };
        wizard.refresh();
        wizard
    }

    pub fn with_rules(mut self, rules: CustomRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_persistence(mut self, debouncer: Debouncer) -> Self {
        self.persistence = Some(debouncer);
        self
    }

    /// Starts at the visible step whose slug matches; otherwise stays on the first step.
    pub fn open_at(mut self, slug: Option<&str>) -> Self {
        if let Some(slug) = slug {
            let position = position_of_slug(&self.visible_steps(), slug);
            match position {
                Some(index) => self.current = index,
                None => tracing::debug!(slug, "deep link does not match a visible step"),
            }
        }
        self
    }

    pub fn form(&self) -> &FormDefinition {
        &self.form
    }

    pub fn answers(&self) -> &AnswerRecord {
        &self.answers
    }

    pub fn status(&self) -> WizardStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn completed(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Raw error map from the last rejected submission, including stale entries.
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn persistence(&self) -> Option<&Debouncer> {
        self.persistence.as_ref()
    }

    fn mode(&self) -> VisibilityMode {
        self.form.policy.malformed_conditions
    }

    pub fn visible_steps(&self) -> Vec<&StepDefinition> {
        visible_steps(&self.form.steps, &self.answers, self.mode())
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        if self.status != WizardStatus::InProgress {
            return None;
        }
        self.visible_steps().get(self.current).copied()
    }

    pub fn current_fields(&self) -> Vec<&FieldDefinition> {
        match self.current_step() {
            Some(step) => step_fields(&self.form.fields, &step.group, &self.answers, self.mode()),
            None => Vec::new(),
        }
    }

    pub fn current_documents(&self) -> Vec<&DocumentDefinition> {
        match self.current_step() {
            Some(step) if step.show_documents => {
                display_documents(&self.form.documents, &self.answers)
            }
            _ => Vec::new(),
        }
    }

    /// Errors that still block the current step; entries of hidden fields are dropped.
    pub fn blocking_errors(&self) -> ErrorMap {
        let fields = self.current_fields();
        errors_for_visible(&self.errors, fields.iter().map(|field| field.id.as_str()))
    }

    /// Stores one answer and re-resolves visibility. Ignored once submitted.
    pub fn set_answer(&mut self, field_id: &str, value: Value) {
        if self.status == WizardStatus::Submitted {
            tracing::debug!(field = field_id, "ignoring edit after submission");
            return;
        }
        self.schedule_persist(field_id, &value);
        self.answers.set(field_id, value);
        self.errors.retain(|_, error| error.field_id != field_id);
        self.refresh();
    }

    pub fn clear_answer(&mut self, field_id: &str) {
        if self.status == WizardStatus::Submitted {
            tracing::debug!(field = field_id, "ignoring edit after submission");
            return;
        }
        if self.answers.remove(field_id).is_some() {
            self.schedule_persist(field_id, &Value::Null);
            self.refresh();
        }
    }

    /// Records the has-errors state reported by a composite sub-form.
    pub fn report_subform_errors(&mut self, field_id: &str, has_errors: bool) {
        self.subform_errors.insert(field_id.to_string(), has_errors);
    }

    pub fn set_document_upload_error(&mut self, has_error: bool) {
        self.document_upload_error = has_error;
    }

    /// Validates the current step with `values` overlaid on the record, then merges and
    /// advances, or submits when this was the last visible step.
    pub fn submit_step(&mut self, values: &AnswerRecord) -> Result<StepOutcome, WizardError> {
        match self.status {
            WizardStatus::Submitted => return Err(WizardError::AlreadySubmitted),
            WizardStatus::NoApplicableSteps => return Err(WizardError::NoApplicableSteps),
            WizardStatus::InProgress => {}
        }

        let form = Arc::clone(&self.form);
        let mode = self.mode();
        let candidate = self.answers.merged_with(values);
        let steps = visible_steps(&form.steps, &self.answers, mode);
        let Some(step) = steps.get(self.current).copied() else {
            return Err(WizardError::NoApplicableSteps);
        };

        let fields = step_fields(&form.fields, &step.group, &candidate, mode);
        let errors = validate_fields(&fields, &candidate, &self.rules).into_error_map();
        let subform_errors = fields
            .iter()
            .any(|field| self.subform_errors.get(&field.id).copied().unwrap_or(false));

        if !errors.is_empty() || self.document_upload_error || subform_errors {
            let outcome = StepOutcome::Rejected {
                errors: errors.len(),
                document_upload_error: self.document_upload_error,
                subform_errors,
            };
            tracing::debug!(step = %step.slug, ?outcome, "step rejected");
            self.errors = errors;
            return Ok(outcome);
        }

        for (field_id, value) in values.iter() {
            self.schedule_persist(field_id, value);
        }
        self.answers = candidate;
        self.errors.clear();

        // The merged answers may show or hide steps, so the next index is located by
        // definition order rather than by the pre-merge position.
        let merged = visible_steps(&form.steps, &self.answers, mode);
        if merged.is_empty() {
            self.refresh();
            return Err(WizardError::NoApplicableSteps);
        }
        if let Some(index) = position_of_slug(&merged, &step.slug) {
            self.completed.insert(index);
        }
        let order = |slug: &str| form.steps.iter().position(|candidate| candidate.slug == slug);
        let submitted_at = order(&step.slug);
        let next = merged
            .iter()
            .take_while(|candidate| order(&candidate.slug) <= submitted_at)
            .count();

        if next >= merged.len() {
            self.current = merged.len() - 1;
            self.finish(&form)?;
            return Ok(StepOutcome::Submitted);
        }

        self.current = next;
        tracing::debug!(from = %step.slug, index = self.current, "advanced to next step");
        Ok(StepOutcome::Advanced {
            index: self.current,
        })
    }

    /// Moves one step back without validating. Completion marks are kept.
    pub fn back(&mut self) -> usize {
        if self.status == WizardStatus::InProgress && self.current > 0 {
            self.current -= 1;
        }
        self.current
    }

    /// Jumps to any visible step, completed or not.
    pub fn go_to(&mut self, index: usize) -> Result<(), WizardError> {
        match self.status {
            WizardStatus::Submitted => return Err(WizardError::AlreadySubmitted),
            WizardStatus::NoApplicableSteps => return Err(WizardError::NoApplicableSteps),
            WizardStatus::InProgress => {}
        }
        let len = self.visible_steps().len();
        if index >= len {
            return Err(WizardError::StepOutOfRange { index, len });
        }
        self.current = index;
        Ok(())
    }

    pub fn view(&self) -> WizardView<'_> {
        match self.status {
            WizardStatus::Submitted => WizardView::Submitted,
            WizardStatus::NoApplicableSteps => WizardView::NoApplicableSteps,
            WizardStatus::InProgress => {
                let steps = self.visible_steps();
                let Some(step) = steps.get(self.current).copied() else {
                    return WizardView::NoApplicableSteps;
                };
                let fields = step_fields(&self.form.fields, &step.group, &self.answers, self.mode());
                let documents = if step.show_documents {
                    display_documents(&self.form.documents, &self.answers)
                } else {
                    Vec::new()
                };
                let errors =
                    errors_for_visible(&self.errors, fields.iter().map(|field| field.id.as_str()));
                WizardView::Step(StepView {
                    index: self.current,
                    total: steps.len(),
                    step,
                    fields,
                    documents,
                    errors,
                    completed: self.is_completed(self.current),
                    is_last: self.current + 1 == steps.len(),
                })
            }
        }
    }

    fn refresh(&mut self) {
        if self.status == WizardStatus::Submitted {
            return;
        }
        let len = self.visible_steps().len();
        if len == 0 {
            if self.status != WizardStatus::NoApplicableSteps {
                tracing::info!(form = %self.form.id, "no steps apply to the current answers");
            }
            self.status = WizardStatus::NoApplicableSteps;
            self.current = 0;
            return;
        }
        self.status = WizardStatus::InProgress;
        if self.current >= len {
            tracing::debug!(from = self.current, to = len - 1, "clamping current step");
            self.current = len - 1;
        }
    }

    fn finish(&mut self, form: &FormDefinition) -> Result<(), WizardError> {
        let submission = Submission {
            form_id: form.id.clone(),
            answers: self.answers.clone(),
            documents: submission_document_ids(&form.documents, &self.answers),
        };
        self.sink.submit(&submission)?;
        self.status = WizardStatus::Submitted;
        tracing::info!(form = %form.id, answers = self.answers.len(), "application submitted");
        Ok(())
    }

    fn schedule_persist(&mut self, field_id: &str, value: &Value) {
        let Some(debouncer) = self.persistence.as_mut() else {
            return;
        };
        let label = self
            .form
            .field(field_id)
            .map(|field| field.label.clone())
            .unwrap_or_else(|| field_id.to_string());
        debouncer.schedule(PersistEntry {
            field_id: field_id.to_string(),
            label,
            value: value.clone(),
        });
    }
}
