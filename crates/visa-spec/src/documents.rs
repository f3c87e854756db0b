//! Document requirements derived from the current answers.
//!
//! Two scopes read the same `conditions` list differently. The display scope shows a
//! document as soon as any condition matches, while the submission scope only sends
//! documents whose conditions all match. Both are kept on purpose.

use serde::{Deserialize, Serialize};

use crate::answers::{AnswerRecord, answer_matches};
use crate::spec::document::{DocumentCondition, DocumentDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentScope {
    /// What the applicant is asked to upload right now (any condition matches).
    Display,
    /// What is sent with the final submission (all conditions match).
    Submission,
}

pub fn condition_matches(condition: &DocumentCondition, answers: &AnswerRecord) -> bool {
    answers
        .get(&condition.question_id)
        .is_some_and(|answer| answer_matches(answer, &condition.value))
}

pub fn is_document_required(
    document: &DocumentDefinition,
    answers: &AnswerRecord,
    scope: DocumentScope,
) -> bool {
    if !document.required {
        return false;
    }
    if document.conditions.is_empty() {
        return true;
    }
    let mut matches = document
        .conditions
        .iter()
        .map(|condition| condition_matches(condition, answers));
    match scope {
        DocumentScope::Display => matches.any(|matched| matched),
        DocumentScope::Submission => matches.all(|matched| matched),
    }
}

/// Required documents for `scope`, in definition order.
pub fn resolve_documents<'a>(
    documents: &'a [DocumentDefinition],
    answers: &AnswerRecord,
    scope: DocumentScope,
) -> Vec<&'a DocumentDefinition> {
    documents
        .iter()
        .filter(|document| is_document_required(document, answers, scope))
        .collect()
}

pub fn display_documents<'a>(
    documents: &'a [DocumentDefinition],
    answers: &AnswerRecord,
) -> Vec<&'a DocumentDefinition> {
    resolve_documents(documents, answers, DocumentScope::Display)
}

pub fn submission_document_ids(
    documents: &[DocumentDefinition],
    answers: &AnswerRecord,
) -> Vec<String> {
    resolve_documents(documents, answers, DocumentScope::Submission)
        .into_iter()
        .map(|document| document.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<DocumentDefinition> {
        vec![
            DocumentDefinition::new("passport", "Passport copy"),
            DocumentDefinition::new("studyLetter", "Acceptance letter")
                .when("visitPurpose", json!("study"))
                .when("hasStudyAcceptance", json!("yes")),
            DocumentDefinition::new("hotelBooking", "Hotel booking")
                .when("assistanceType", json!("hotel")),
            DocumentDefinition::new("photo", "Photo").optional(),
        ]
    }

    fn ids(documents: &[&DocumentDefinition]) -> Vec<String> {
        documents.iter().map(|document| document.id.clone()).collect()
    }

    #[test]
    fn display_uses_any_and_submission_uses_all() {
        let answers = AnswerRecord::from_value(
            json!({ "visitPurpose": "study", "hasStudyAcceptance": "no" }),
        );
        let documents = catalog();
        assert_eq!(
            ids(&display_documents(&documents, &answers)),
            vec!["passport", "studyLetter"]
        );
        assert_eq!(
            submission_document_ids(&documents, &answers),
            vec!["passport".to_string()]
        );
    }

    #[test]
    fn both_scopes_agree_when_all_conditions_match() {
        let answers = AnswerRecord::from_value(
            json!({ "visitPurpose": "study", "hasStudyAcceptance": "yes" }),
        );
        let documents = catalog();
        assert_eq!(
            ids(&display_documents(&documents, &answers)),
            submission_document_ids(&documents, &answers)
        );
    }

    #[test]
    fn conditions_match_array_answers_by_membership() {
        let answers = AnswerRecord::from_value(json!({ "assistanceType": ["hotel", "flight"] }));
        let documents = catalog();
        assert!(submission_document_ids(&documents, &answers).contains(&"hotelBooking".into()));
    }

    #[test]
    fn optional_documents_are_never_required() {
        let answers = AnswerRecord::new();
        let documents = catalog();
        for scope in [DocumentScope::Display, DocumentScope::Submission] {
            assert!(
                !resolve_documents(&documents, &answers, scope)
                    .iter()
                    .any(|document| document.id == "photo")
            );
        }
    }
}
