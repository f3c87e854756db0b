use std::collections::{BTreeMap, BTreeSet};

use crate::answers::{AnswerRecord, ErrorMap, values_equal};
use crate::condition::VisibilityMode;
use crate::spec::field::FieldDefinition;

pub type VisibilityMap = BTreeMap<String, bool>;

/// Every legacy dependency must hold by strict equality; no dependencies means met.
pub fn dependencies_met(field: &FieldDefinition, answers: &AnswerRecord) -> bool {
    field.dependencies.iter().all(|dependency| {
        answers
            .get(&dependency.field_id)
            .is_some_and(|answer| values_equal(answer, &dependency.value))
    })
}

pub fn is_field_visible(
    field: &FieldDefinition,
    answers: &AnswerRecord,
    mode: VisibilityMode,
) -> bool {
    let show_if_met = field
        .show_if
        .as_ref()
        .is_none_or(|condition| condition.evaluate_with(answers, mode));
    dependencies_met(field, answers) && show_if_met
}

pub fn resolve_visibility(
    fields: &[FieldDefinition],
    answers: &AnswerRecord,
    mode: VisibilityMode,
) -> VisibilityMap {
    fields
        .iter()
        .map(|field| (field.id.clone(), is_field_visible(field, answers, mode)))
        .collect()
}

pub fn visible_field_ids<'a>(
    fields: &'a [FieldDefinition],
    answers: &AnswerRecord,
    mode: VisibilityMode,
) -> BTreeSet<&'a str> {
    fields
        .iter()
        .filter(|field| is_field_visible(field, answers, mode))
        .map(|field| field.id.as_str())
        .collect()
}

/// Visible fields of one step group, in definition order.
pub fn step_fields<'a>(
    fields: &'a [FieldDefinition],
    group: &str,
    answers: &AnswerRecord,
    mode: VisibilityMode,
) -> Vec<&'a FieldDefinition> {
    fields
        .iter()
        .filter(|field| field.group == group && is_field_visible(field, answers, mode))
        .collect()
}

/// Drops errors that belong to fields outside `visible`. Stale entries for hidden
/// fields stay in the caller's map but never block a submission.
pub fn errors_for_visible<'a, I>(errors: &ErrorMap, visible: I) -> ErrorMap
where
    I: IntoIterator<Item = &'a str>,
{
    let visible: BTreeSet<&str> = visible.into_iter().collect();
    errors
        .iter()
        .filter(|(_, error)| visible.contains(error.field_id.as_str()))
        .map(|(path, error)| (path.clone(), error.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::ValidationError;
    use crate::condition::Condition;
    use crate::spec::field::FieldKind;
    use serde_json::json;

    fn study_fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("visitPurpose", "trip", FieldKind::Select)
                .with_options(["tourism", "study"]),
            FieldDefinition::new("hasStudyAcceptance", "trip", FieldKind::Radio)
                .with_options(["yes", "no"])
                .depends_on("visitPurpose", json!("study")),
            FieldDefinition::new("acceptanceExplanation", "trip", FieldKind::Textarea)
                .required()
                .show_if(Condition::all(vec![
                    Condition::equals("visitPurpose", json!("study")),
                    Condition::equals("hasStudyAcceptance", json!("no")),
                ])),
            FieldDefinition::new("passportNumber", "passport", FieldKind::Text),
        ]
    }

    #[test]
    fn dependencies_use_strict_equality() {
        let field = FieldDefinition::new("x", "g", FieldKind::Text).depends_on("kind", json!("a"));
        let array = AnswerRecord::from_value(json!({ "kind": ["a"] }));
        assert!(!dependencies_met(&field, &array));
        let exact = AnswerRecord::from_value(json!({ "kind": "a" }));
        assert!(dependencies_met(&field, &exact));
    }

    #[test]
    fn show_if_and_dependencies_combine() {
        let fields = study_fields();
        let answers =
            AnswerRecord::from_value(json!({ "visitPurpose": "study", "hasStudyAcceptance": "no" }));
        let map = resolve_visibility(&fields, &answers, VisibilityMode::Visible);
        assert_eq!(map["hasStudyAcceptance"], true);
        assert_eq!(map["acceptanceExplanation"], true);

        let answers =
            AnswerRecord::from_value(json!({ "visitPurpose": "study", "hasStudyAcceptance": "yes" }));
        let map = resolve_visibility(&fields, &answers, VisibilityMode::Visible);
        assert_eq!(map["acceptanceExplanation"], false);
    }

    #[test]
    fn step_fields_stay_inside_the_group() {
        let fields = study_fields();
        let answers = AnswerRecord::from_value(json!({ "visitPurpose": "study" }));
        let trip = step_fields(&fields, "trip", &answers, VisibilityMode::Visible);
        assert!(trip.iter().all(|field| field.group == "trip"));
        assert_eq!(
            trip.iter().map(|field| field.id.as_str()).collect::<Vec<_>>(),
            vec!["visitPurpose", "hasStudyAcceptance"]
        );
    }

    #[test]
    fn resolution_ignores_field_order() {
        let fields = study_fields();
        let mut reversed = fields.clone();
        reversed.reverse();
        let answers =
            AnswerRecord::from_value(json!({ "visitPurpose": "study", "hasStudyAcceptance": "no" }));
        assert_eq!(
            resolve_visibility(&fields, &answers, VisibilityMode::Visible),
            resolve_visibility(&reversed, &answers, VisibilityMode::Visible)
        );
    }

    #[test]
    fn hidden_field_errors_are_suppressed() {
        let mut errors = ErrorMap::new();
        errors.insert(
            "acceptanceExplanation".into(),
            ValidationError::new(
                "acceptanceExplanation",
                "acceptanceExplanation",
                "this field is required",
                "missing_required",
            ),
        );
        let fields = study_fields();
        let answers =
            AnswerRecord::from_value(json!({ "visitPurpose": "study", "hasStudyAcceptance": "yes" }));
        let visible = visible_field_ids(&fields, &answers, VisibilityMode::Visible);
        assert!(errors_for_visible(&errors, visible).is_empty());
        assert_eq!(errors.len(), 1);
    }
}
