use crate::answers::AnswerRecord;
use crate::condition::VisibilityMode;
use crate::spec::step::StepDefinition;

/// Steps that apply to the cumulative answers, in definition order.
pub fn visible_steps<'a>(
    steps: &'a [StepDefinition],
    answers: &AnswerRecord,
    mode: VisibilityMode,
) -> Vec<&'a StepDefinition> {
    steps
        .iter()
        .filter(|step| {
            step.show_if
                .as_ref()
                .is_none_or(|condition| condition.evaluate_with(answers, mode))
        })
        .collect()
}

pub fn position_of_slug(steps: &[&StepDefinition], slug: &str) -> Option<usize> {
    steps.iter().position(|step| step.slug == slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use serde_json::json;

    fn steps() -> Vec<StepDefinition> {
        vec![
            StepDefinition::new("Personal", "personal", "personal"),
            StepDefinition::new("Residence", "residence", "residence").show_if(Condition::equals(
                "livesInCitizenshipCountry",
                json!("no"),
            )),
            StepDefinition::new("Hotel", "hotel", "hotel")
                .show_if(Condition::equals("assistanceType", json!("hotel"))),
            StepDefinition::new("Documents", "documents", "documents").documents(),
        ]
    }

    fn slugs(steps: &[&StepDefinition]) -> Vec<String> {
        steps.iter().map(|step| step.slug.clone()).collect()
    }

    #[test]
    fn gated_step_follows_answer() {
        let steps = steps();
        let abroad = AnswerRecord::from_value(json!({ "livesInCitizenshipCountry": "no" }));
        assert_eq!(
            slugs(&visible_steps(&steps, &abroad, VisibilityMode::Visible)),
            vec!["personal", "residence", "documents"]
        );

        let home = AnswerRecord::from_value(json!({ "livesInCitizenshipCountry": "yes" }));
        assert_eq!(
            slugs(&visible_steps(&steps, &home, VisibilityMode::Visible)),
            vec!["personal", "documents"]
        );
    }

    #[test]
    fn array_answers_gate_steps_like_fields() {
        let steps = steps();
        let answers = AnswerRecord::from_value(json!({ "assistanceType": ["flight", "hotel"] }));
        let visible = visible_steps(&steps, &answers, VisibilityMode::Visible);
        assert_eq!(position_of_slug(&visible, "hotel"), Some(1));
        assert_eq!(position_of_slug(&visible, "residence"), None);
    }
}
