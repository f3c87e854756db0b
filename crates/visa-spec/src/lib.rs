#![allow(missing_docs)]

pub mod answers;
pub mod condition;
pub mod documents;
pub mod persist;
pub mod render;
pub mod spec;
pub mod steps;
pub mod validate;
pub mod visibility;
pub mod wizard;

pub use answers::{AnswerRecord, ErrorMap, ValidationError, ValidationReport};
pub use condition::{Condition, Operator, VisibilityMode};
pub use documents::{
    DocumentScope, display_documents, is_document_required, resolve_documents,
    submission_document_ids,
};
pub use persist::{AnswerPersister, DebounceError, Debouncer, PersistEntry, PersistError};
pub use render::{
    RenderField, RenderPayload, RenderProgress, RenderStep, build_render_payload, render_json_ui,
    render_text,
};
pub use spec::{
    DocumentDefinition, FieldDefinition, FieldKind, FormDefinition, FormError, FormPolicy,
    StepDefinition,
};
pub use steps::visible_steps;
pub use validate::{CustomRules, validate_fields, validate_fields_with, validate_form};
pub use visibility::{VisibilityMap, resolve_visibility, step_fields, visible_field_ids};
pub use wizard::{
    StepOutcome, StepView, Submission, SubmissionSink, SubmitError, Wizard, WizardError,
    WizardStatus, WizardView,
};
