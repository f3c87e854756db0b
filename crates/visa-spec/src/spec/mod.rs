pub mod document;
pub mod field;
pub mod form;
pub mod step;

pub use document::{DocumentCondition, DocumentDefinition};
pub use field::{FieldDefinition, FieldDependency, FieldKind, FieldOption, FieldValidation};
pub use form::{DEFAULT_PERSIST_DEBOUNCE_MS, FormDefinition, FormError, FormPolicy};
pub use step::StepDefinition;
