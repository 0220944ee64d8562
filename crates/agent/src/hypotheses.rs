use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{CapabilityError, Hypothesis, HypothesisGenerator, TestKind, VariableType};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::llm::LlmClient;
use crate::prompts::PromptLibrary;
use crate::text::{json_object, strip_reasoning};

const CAPABILITY: &str = "hypothesis_generator";

/// Generates testable hypotheses about the dataset with a chat model.
pub struct LlmHypothesisGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    schema_description: String,
}

impl LlmHypothesisGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        schema_description: impl Into<String>,
    ) -> Self {
        Self { llm, prompts, schema_description: schema_description.into() }
    }
}

#[async_trait]
impl HypothesisGenerator for LlmHypothesisGenerator {
    async fn generate_hypotheses(
        &self,
        question: &str,
        count: usize,
    ) -> Result<Vec<Hypothesis>, CapabilityError> {
        let prompt = self.prompts.hypotheses(question, &self.schema_description, count)?;
        let raw = self.llm.complete(&prompt).await?;
        let hypotheses = parse_hypotheses(&raw)?;
        debug!(
            event_name = "analysis.hypotheses.parsed",
            requested = count,
            parsed = hypotheses.len(),
            "hypotheses parsed from model reply"
        );
        Ok(hypotheses)
    }
}

#[derive(Debug, Deserialize)]
struct HypothesisItem {
    #[serde(default)]
    hypothesis_id: Option<Value>,
    #[serde(default, alias = "null")]
    null_hypothesis: Option<String>,
    #[serde(default, alias = "alternative")]
    alternative_hypothesis: Option<String>,
    #[serde(default)]
    variable_1: Option<String>,
    #[serde(default)]
    variable_2: Option<String>,
    #[serde(default)]
    variable_1_type: Option<String>,
    #[serde(default)]
    variable_2_type: Option<String>,
    #[serde(default)]
    recommended_test: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Reads hypotheses from a model reply. Accepts either `{"hypotheses": [...]}` or a
/// bare array, skips items that do not name two variables, and numbers the survivors
/// from 1 when the model's ids are missing or unusable.
pub fn parse_hypotheses(raw: &str) -> Result<Vec<Hypothesis>, CapabilityError> {
    let cleaned = strip_reasoning(raw);
    let value = json_payload(&cleaned).ok_or_else(|| {
        CapabilityError::invalid_output(CAPABILITY, "model reply did not contain JSON")
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("hypotheses") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(CapabilityError::invalid_output(
                    CAPABILITY,
                    "reply is missing a `hypotheses` array",
                ))
            }
        },
        _ => {
            return Err(CapabilityError::invalid_output(CAPABILITY, "reply is not a JSON object"))
        }
    };

    let mut hypotheses = Vec::new();
    for item in items {
        let Ok(item) = serde_json::from_value::<HypothesisItem>(item) else {
            continue;
        };
        if let Some(hypothesis) = item.into_hypothesis(hypotheses.len() as u32 + 1) {
            hypotheses.push(hypothesis);
        }
    }

    let ids_unique = {
        let mut ids = hypotheses.iter().map(|hypothesis| hypothesis.id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        ids.len() == hypotheses.len()
    };
    if !ids_unique {
        for (index, hypothesis) in hypotheses.iter_mut().enumerate() {
            hypothesis.id = index as u32 + 1;
        }
    }

    Ok(hypotheses)
}

impl HypothesisItem {
    fn into_hypothesis(self, fallback_id: u32) -> Option<Hypothesis> {
        let variable_a = non_blank(self.variable_1)?.to_ascii_lowercase();
        let variable_b = non_blank(self.variable_2)?.to_ascii_lowercase();
        if variable_a == variable_b {
            return None;
        }

        let variable_a_type = self
            .variable_1_type
            .as_deref()
            .and_then(VariableType::parse_label)
            .unwrap_or(VariableType::Categorical);
        let variable_b_type = self
            .variable_2_type
            .as_deref()
            .and_then(VariableType::parse_label)
            .unwrap_or(VariableType::Categorical);
        let recommended_test = self
            .recommended_test
            .as_deref()
            .and_then(TestKind::parse_label)
            .unwrap_or_else(|| TestKind::for_variables(variable_a_type, variable_b_type, None));

        let id = self
            .hypothesis_id
            .as_ref()
            .and_then(|value| match value {
                Value::Number(number) => number.as_u64(),
                Value::String(text) => text.trim().trim_start_matches(['H', 'h']).parse().ok(),
                _ => None,
            })
            .and_then(|id| u32::try_from(id).ok())
            .filter(|id| *id > 0)
            .unwrap_or(fallback_id);

        let null_statement = non_blank(self.null_hypothesis)
            .unwrap_or_else(|| format!("There is no relationship between {variable_a} and {variable_b}"));
        let alternative_statement = non_blank(self.alternative_hypothesis)
            .unwrap_or_else(|| format!("There is a relationship between {variable_a} and {variable_b}"));

        Some(Hypothesis {
            id,
            null_statement,
            alternative_statement,
            variable_a,
            variable_b,
            variable_a_type,
            variable_b_type,
            recommended_test,
            rationale: non_blank(self.rationale).unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty())
}

fn json_payload(text: &str) -> Option<Value> {
    let array = || -> Option<Value> {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    };
    let object = || -> Option<Value> { serde_json::from_str(json_object(text)?).ok() };

    let array_first = match (text.find('['), text.find('{')) {
        (Some(bracket), Some(brace)) => bracket < brace,
        (Some(_), None) => true,
        _ => false,
    };
    if array_first {
        array().or_else(object)
    } else {
        object().or_else(array)
    }
}

#[cfg(test)]
mod tests {
    use insight_core::{TestKind, VariableType};

    use super::parse_hypotheses;

    #[test]
    fn wrapped_array_is_parsed() {
        let raw = r#"```json
{"hypotheses": [
  {"hypothesis_id": 1, "null_hypothesis": "Overtime does not affect attrition",
   "alternative_hypothesis": "Overtime affects attrition", "variable_1": "OverTime",
   "variable_2": "Attrition", "variable_1_type": "categorical", "variable_2_type": "categorical",
   "recommended_test": "Chi-Square", "rationale": "workload"},
  {"hypothesis_id": 2, "variable_1": "attrition", "variable_2": "monthlyincome",
   "variable_1_type": "categorical", "variable_2_type": "numerical", "recommended_test": "t-test"}
]}
```"#;
        let hypotheses = parse_hypotheses(raw).expect("parsed");

        assert_eq!(hypotheses.len(), 2);
        assert_eq!(hypotheses[0].variable_a, "overtime");
        assert_eq!(hypotheses[0].recommended_test, TestKind::ChiSquare);
        assert_eq!(hypotheses[1].variable_b_type, VariableType::Numeric);
        assert!(hypotheses[1].null_statement.contains("monthlyincome"));
    }

    #[test]
    fn incomplete_items_are_skipped_and_ids_fall_back() {
        let raw = r#"[
            {"variable_1": "age"},
            {"variable_1": "age", "variable_2": "age"},
            {"variable_1": "age", "variable_2": "totalworkingyears",
             "variable_1_type": "numerical", "variable_2_type": "numerical", "recommended_test": "regression"}
        ]"#;
        let hypotheses = parse_hypotheses(raw).expect("parsed");

        assert_eq!(hypotheses.len(), 1);
        assert_eq!(hypotheses[0].id, 1);
        assert_eq!(hypotheses[0].recommended_test, TestKind::Correlation);
    }

    #[test]
    fn duplicate_ids_are_renumbered() {
        let raw = r#"{"hypotheses": [
            {"hypothesis_id": "H1", "variable_1": "gender", "variable_2": "attrition"},
            {"hypothesis_id": 1, "variable_1": "department", "variable_2": "attrition"}
        ]}"#;
        let ids = parse_hypotheses(raw).expect("parsed").iter().map(|h| h.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn non_json_reply_is_invalid_output() {
        let error = parse_hypotheses("Overtime probably matters.").expect_err("no json");
        assert_eq!(error.capability(), "hypothesis_generator");
    }
}
