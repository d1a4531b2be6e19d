use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::interaction::InteractionHandler;

/// One question the agent puts to the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskUserQuestion {
    pub question: String,
    pub header: String,
    pub options: Vec<AskUserOption>,
    #[serde(rename = "multiSelect")]
    pub multi_select: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskUserOption {
    pub label: String,
    pub description: String,
}

/// Raw selection the modal returns for one question.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskUserReply {
    /// Chosen option labels, in selection order.
    pub selected: Vec<String>,
    /// Free text typed into the "Other" field, if used.
    pub other: Option<String>,
}

/// Collapse modal replies into the answer map returned to the agent.
///
/// Single-select: the chosen label, or the "Other" free text, or empty
/// string when nothing was chosen. Multi-select: chosen labels joined with
/// `", "` in selection order, with any "Other" text appended last. Missing
/// replies (modal dismissed early) answer as empty strings.
pub fn format_answers(
    questions: &[AskUserQuestion],
    replies: &[AskUserReply],
) -> HashMap<String, String> {
    let mut answers = HashMap::with_capacity(questions.len());
    for (slot, question) in questions.iter().enumerate() {
        let answer = match replies.get(slot) {
            None => String::new(),
            Some(reply) if question.multi_select => {
                let mut labels = reply.selected.clone();
                if let Some(other) = reply.other.as_ref().filter(|text| !text.is_empty()) {
                    labels.push(other.clone());
                }
                labels.join(", ")
            }
            Some(reply) => reply
                .other
                .clone()
                .or_else(|| reply.selected.first().cloned())
                .unwrap_or_default(),
        };
        answers.insert(question.question.clone(), answer);
    }
    answers
}

/// Run the ask-user-question tool against the human-decision collaborator.
///
/// The transport adapter wires this in as the tool's executor; the core
/// only owns the answer-shaping rules.
pub async fn ask_user_questions(
    handler: &dyn InteractionHandler,
    questions: Vec<AskUserQuestion>,
) -> Result<HashMap<String, String>, AgentError> {
    let replies = handler.ask_questions(&questions).await?;
    Ok(format_answers(&questions, &replies))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, multi_select: bool, labels: &[&str]) -> AskUserQuestion {
        AskUserQuestion {
            question: text.to_string(),
            header: "TEST".to_string(),
            options: labels
                .iter()
                .map(|label| AskUserOption {
                    label: (*label).to_string(),
                    description: format!("{label} option"),
                })
                .collect(),
            multi_select,
        }
    }

    #[test]
    fn format_answers_single_select_uses_chosen_label() {
        let questions = vec![question("Proceed?", false, &["Yes", "No"])];
        let replies = vec![AskUserReply {
            selected: vec!["Yes".to_string()],
            other: None,
        }];
        let answers = format_answers(&questions, &replies);
        assert_eq!(answers["Proceed?"], "Yes");
    }

    #[test]
    fn format_answers_single_select_other_text_wins() {
        let questions = vec![question("Format?", false, &["JSON", "YAML"])];
        let replies = vec![AskUserReply {
            selected: vec!["JSON".to_string()],
            other: Some("TOML actually".to_string()),
        }];
        let answers = format_answers(&questions, &replies);
        assert_eq!(answers["Format?"], "TOML actually");
    }

    #[test]
    fn format_answers_nothing_chosen_expected_empty_string() {
        let questions = vec![question("Pick one", false, &["A", "B"])];
        let answers = format_answers(&questions, &[AskUserReply::default()]);
        assert_eq!(answers["Pick one"], "");
    }

    #[test]
    fn format_answers_multi_select_joins_in_selection_order() {
        let questions = vec![question("Features?", true, &["Lint", "Test", "CI"])];
        let replies = vec![AskUserReply {
            selected: vec!["CI".to_string(), "Lint".to_string()],
            other: None,
        }];
        let answers = format_answers(&questions, &replies);
        assert_eq!(answers["Features?"], "CI, Lint");
    }

    #[test]
    fn format_answers_multi_select_appends_other_text() {
        let questions = vec![question("Features?", true, &["Lint", "Test"])];
        let replies = vec![AskUserReply {
            selected: vec!["Lint".to_string()],
            other: Some("Docs".to_string()),
        }];
        let answers = format_answers(&questions, &replies);
        assert_eq!(answers["Features?"], "Lint, Docs");
    }

    #[test]
    fn format_answers_missing_reply_expected_empty_string() {
        let questions = vec![
            question("First?", false, &["A"]),
            question("Second?", false, &["B"]),
        ];
        let replies = vec![AskUserReply {
            selected: vec!["A".to_string()],
            other: None,
        }];
        let answers = format_answers(&questions, &replies);
        assert_eq!(answers["First?"], "A");
        assert_eq!(answers["Second?"], "");
    }

    #[test]
    fn ask_user_question_deserializes_modal_payload() {
        let payload = serde_json::json!({
            "question": "Which format do you prefer?",
            "header": "FORMAT",
            "options": [
                {"label": "JSON", "description": "JavaScript Object Notation"},
                {"label": "YAML", "description": "YAML Ain't Markup Language"}
            ],
            "multiSelect": false
        });
        let question: AskUserQuestion =
            serde_json::from_value(payload).expect("question should deserialize");
        assert_eq!(question.options.len(), 2);
        assert!(!question.multi_select);
    }
}
