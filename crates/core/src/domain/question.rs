use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AnalysisError;

pub const MAX_QUESTION_CHARS: usize = 2_000;

/// A validated, trimmed user question. Lives for a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    text: String,
    received_at: DateTime<Utc>,
}

impl Question {
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(AnalysisError::invalid_input("question must not be empty"));
        }
        let length = text.chars().count();
        if length > MAX_QUESTION_CHARS {
            return Err(AnalysisError::invalid_input(format!(
                "question is {length} characters long; the limit is {MAX_QUESTION_CHARS}"
            )));
        }

        Ok(Self { text: text.to_owned(), received_at: Utc::now() })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Facts and aggregates, answered with a query and a table.
    #[serde(rename = "WHAT")]
    Descriptive,
    /// Explanations, answered with hypotheses and significance tests.
    #[serde(rename = "WHY")]
    Causal,
}

impl QuestionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Descriptive => "WHAT",
            Self::Causal => "WHY",
        }
    }

    pub fn analysis_type(&self) -> &'static str {
        match self {
            Self::Descriptive => "descriptive_analytics",
            Self::Causal => "causal_analytics",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Routing decision for one question. Only `kind` drives control flow; the
/// remaining fields are advisory and passed through for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "question_type")]
    pub kind: QuestionKind,
    pub rationale: String,
    pub suggested_collaborators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_approach: Option<String>,
}

impl Classification {
    pub fn new(kind: QuestionKind, rationale: impl Into<String>) -> Self {
        Self {
            kind,
            rationale: rationale.into(),
            suggested_collaborators: default_collaborators(kind),
            analysis_approach: None,
        }
    }
}

pub fn default_collaborators(kind: QuestionKind) -> Vec<String> {
    let names: &[&str] = match kind {
        QuestionKind::Descriptive => &["text_to_sql", "visualization"],
        QuestionKind::Causal => &["hypothesis", "statistical_testing"],
    };
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::{Classification, Question, QuestionKind, MAX_QUESTION_CHARS};
    use crate::errors::ErrorKind;

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let question = Question::parse("  What is the attrition rate?\n").expect("valid question");
        assert_eq!(question.text(), "What is the attrition rate?");
    }

    #[test]
    fn whitespace_only_question_is_invalid_input() {
        for raw in ["", "   ", "\n\t "] {
            let error = Question::parse(raw).expect_err("blank input must be rejected");
            assert_eq!(error.kind, ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn oversized_question_is_invalid_input() {
        let raw = "a".repeat(MAX_QUESTION_CHARS + 1);
        let error = Question::parse(&raw).expect_err("oversized input must be rejected");
        assert_eq!(error.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn question_kind_uses_wire_labels() {
        assert_eq!(serde_json::to_string(&QuestionKind::Descriptive).expect("json"), "\"WHAT\"");
        assert_eq!(serde_json::to_string(&QuestionKind::Causal).expect("json"), "\"WHY\"");
    }

    #[test]
    fn classification_defaults_collaborators_by_kind() {
        let classification = Classification::new(QuestionKind::Causal, "asks for a reason");
        assert_eq!(classification.suggested_collaborators, vec!["hypothesis", "statistical_testing"]);
    }
}
