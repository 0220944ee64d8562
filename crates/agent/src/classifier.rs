use std::sync::Arc;
use std::time::Duration;

use insight_core::domain::question::default_collaborators;
use insight_core::{
    AnalysisError, Classification, ClassifierCapability, ErrorKind, Question, QuestionKind,
};
use serde::Deserialize;
use tracing::debug;

use crate::prompts::PromptLibrary;
use crate::text::{json_object, strip_reasoning};
use crate::timeouts::bounded;

const CAPABILITY: &str = "classifier";

/// Maps a question onto exactly one [`QuestionKind`].
pub struct QuestionClassifier {
    capability: Arc<dyn ClassifierCapability>,
    prompts: Arc<PromptLibrary>,
    schema_description: String,
    timeout: Duration,
}

impl QuestionClassifier {
    pub fn new(
        capability: Arc<dyn ClassifierCapability>,
        prompts: Arc<PromptLibrary>,
        schema_description: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { capability, prompts, schema_description: schema_description.into(), timeout }
    }

    pub async fn classify(&self, question: &Question) -> Result<Classification, AnalysisError> {
        let prompt = self
            .prompts
            .classification(question.text(), &self.schema_description)
            .map_err(|error| error.into_analysis(ErrorKind::ClassifierUnavailable))?;

        let raw = bounded(CAPABILITY, self.timeout, self.capability.classify_text(&prompt))
            .await
            .map_err(|error| error.into_analysis(ErrorKind::ClassifierUnavailable))?;

        let classification = normalize_classification(&raw);
        debug!(
            event_name = "analysis.classifier.normalized",
            question_type = classification.kind.label(),
            "classifier output normalized"
        );
        Ok(classification)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlannerReply {
    #[serde(default)]
    question_type: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    agents_to_call: Option<Vec<String>>,
    #[serde(default)]
    analysis_approach: Option<String>,
}

/// Turns free-form classifier output into a [`Classification`].
///
/// JSON replies are read from their `question_type` field; anything else is scanned
/// for the bare labels, and the first label that appears decides the kind. Output
/// that names neither kind resolves to [`QuestionKind::Descriptive`].
pub fn normalize_classification(raw: &str) -> Classification {
    let cleaned = strip_reasoning(raw);
    let parsed = json_object(&cleaned)
        .and_then(|object| serde_json::from_str::<PlannerReply>(object).ok());

    let label_source = match &parsed {
        Some(reply) => reply.question_type.clone().unwrap_or_default(),
        None => cleaned.clone(),
    };
    let reply = parsed.unwrap_or_default();
    let (kind, matched) = match label_kind(&label_source) {
        Some(kind) => (kind, true),
        None => (QuestionKind::Descriptive, false),
    };

    let rationale = match (reply.reasoning, matched) {
        (Some(reasoning), true) if !reasoning.trim().is_empty() => reasoning.trim().to_owned(),
        (_, true) => format!("classified as {}", kind.label()),
        (_, false) => "classifier output was ambiguous; defaulted to descriptive".to_owned(),
    };

    let suggested_collaborators = reply
        .agents_to_call
        .filter(|agents| matched && !agents.is_empty())
        .unwrap_or_else(|| default_collaborators(kind));

    Classification {
        kind,
        rationale,
        suggested_collaborators,
        analysis_approach: reply.analysis_approach.filter(|approach| !approach.trim().is_empty()),
    }
}

fn label_kind(text: &str) -> Option<QuestionKind> {
    text.split(|ch: char| !ch.is_ascii_alphanumeric()).find_map(|word| {
        match word.to_ascii_uppercase().as_str() {
            "WHAT" | "DESCRIPTIVE" => Some(QuestionKind::Descriptive),
            "WHY" | "CAUSAL" => Some(QuestionKind::Causal),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use insight_core::{CapabilityError, ClassifierCapability, ErrorKind, Question, QuestionKind};

    use super::{normalize_classification, QuestionClassifier};
    use crate::prompts::PromptLibrary;

    #[test]
    fn json_labels_map_to_kinds() {
        let why = normalize_classification(
            r#"{"question_type": "WHY", "reasoning": "asks for causes", "agents_to_call": ["hypothesis"]}"#,
        );
        assert_eq!(why.kind, QuestionKind::Causal);
        assert_eq!(why.rationale, "asks for causes");
        assert_eq!(why.suggested_collaborators, vec!["hypothesis"]);

        let what = normalize_classification(r#"{"question_type": "what"}"#);
        assert_eq!(what.kind, QuestionKind::Descriptive);
        assert_eq!(what.suggested_collaborators, vec!["text_to_sql", "visualization"]);
    }

    #[test]
    fn fenced_and_reasoning_wrapped_output_is_parsed() {
        let raw = "<think>The user asks why, so causal.</think>\n```json\n{\"question_type\": \"WHY\"}\n```";
        assert_eq!(normalize_classification(raw).kind, QuestionKind::Causal);
    }

    #[test]
    fn bare_labels_are_accepted() {
        assert_eq!(normalize_classification("CAUSAL").kind, QuestionKind::Causal);
        assert_eq!(normalize_classification("  descriptive.  ").kind, QuestionKind::Descriptive);
    }

    #[test]
    fn ambiguous_or_unknown_output_defaults_to_descriptive() {
        for raw in ["", "maybe?", r#"{"question_type": "HOW"}"#, "{not json"] {
            let classification = normalize_classification(raw);
            assert_eq!(classification.kind, QuestionKind::Descriptive, "input {raw:?}");
            assert!(classification.rationale.contains("defaulted"), "input {raw:?}");
        }
    }

    #[test]
    fn first_label_in_prose_wins() {
        let leading_why = normalize_classification("WHY - the user asks what drives attrition");
        assert_eq!(leading_why.kind, QuestionKind::Causal);
        assert_eq!(leading_why.rationale, "classified as WHY");

        let leading_what = normalize_classification("WHAT: a count per department, no need to ask why");
        assert_eq!(leading_what.kind, QuestionKind::Descriptive);

        let json = normalize_classification(r#"{"question_type": "CAUSAL (not what)"}"#);
        assert_eq!(json.kind, QuestionKind::Causal);
    }

    #[test]
    fn labels_inside_words_do_not_count() {
        assert_eq!(normalize_classification("WHYNOT").kind, QuestionKind::Descriptive);
        assert_eq!(normalize_classification("somewhat causal").kind, QuestionKind::Causal);
    }

    struct ScriptedCapability {
        reply: Result<String, CapabilityError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassifierCapability for ScriptedCapability {
        async fn classify_text(&self, _prompt: &str) -> Result<String, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    fn classifier(capability: Arc<ScriptedCapability>) -> QuestionClassifier {
        QuestionClassifier::new(
            capability,
            Arc::new(PromptLibrary::new().expect("templates")),
            "hr_employee_attrition",
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn capability_failure_maps_to_classifier_unavailable() {
        let capability = Arc::new(ScriptedCapability {
            reply: Err(CapabilityError::unavailable("llm", "connection refused")),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let question = Question::parse("Why do employees leave?").expect("question");

        let error = classifier(capability.clone()).classify(&question).await.expect_err("fails");
        assert_eq!(error.kind, ErrorKind::ClassifierUnavailable);
        assert!(error.message.contains("connection refused"));
        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_capability_times_out() {
        let capability = Arc::new(ScriptedCapability {
            reply: Ok("WHY".to_owned()),
            delay: Duration::from_millis(500),
            calls: AtomicUsize::new(0),
        });
        let question = Question::parse("Why do employees leave?").expect("question");

        let error = classifier(capability).classify(&question).await.expect_err("times out");
        assert_eq!(error.kind, ErrorKind::ClassifierUnavailable);
        assert!(error.message.contains("timed out"));
    }
}
