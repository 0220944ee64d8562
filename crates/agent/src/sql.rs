use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{CapabilityError, QueryGenerator};

use crate::llm::LlmClient;
use crate::prompts::PromptLibrary;
use crate::text::{fenced_block, strip_reasoning};

const CAPABILITY: &str = "query_generator";

/// Text-to-SQL backed by a chat model.
pub struct LlmQueryGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmQueryGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    async fn generate_query(
        &self,
        question: &str,
        schema_description: &str,
    ) -> Result<String, CapabilityError> {
        let prompt = self.prompts.query(question, schema_description)?;
        let raw = self.llm.complete(&prompt).await?;
        extract_query(&raw).ok_or_else(|| {
            CapabilityError::invalid_output(CAPABILITY, "model reply did not contain a query")
        })
    }
}

/// Pulls a single query out of a model reply: a ```sql fence wins, then any fence,
/// then the text from the first SELECT or WITH onwards.
pub fn extract_query(raw: &str) -> Option<String> {
    let cleaned = strip_reasoning(raw);
    let body = fenced_block(&cleaned, Some("sql"))
        .or_else(|| fenced_block(&cleaned, None))
        .map(str::to_owned)
        .or_else(|| statement_start(&cleaned).map(|start| cleaned[start..].to_owned()))?;

    let query = body.trim().trim_end_matches(';').trim().to_owned();
    (!query.is_empty()).then_some(query)
}

fn statement_start(text: &str) -> Option<usize> {
    let upper = text.to_ascii_uppercase();
    ["SELECT", "WITH"]
        .iter()
        .filter_map(|keyword| {
            upper.match_indices(keyword).map(|(index, _)| index).find(|index| {
                let before = upper[..*index].chars().next_back();
                let after = upper[index + keyword.len()..].chars().next();
                !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
            })
        })
        .min()
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::extract_query;

    #[test]
    fn sql_fence_is_preferred() {
        let raw = "Here you go:\n```text\nignored\n```\n```sql\nSELECT COUNT(*) FROM hr_employee_attrition;\n```";
        assert_eq!(extract_query(raw).as_deref(), Some("SELECT COUNT(*) FROM hr_employee_attrition"));
    }

    #[test]
    fn generic_fence_is_accepted() {
        let raw = "```\nSELECT department FROM hr_employee_attrition\n```";
        assert_eq!(extract_query(raw).as_deref(), Some("SELECT department FROM hr_employee_attrition"));
    }

    #[test]
    fn bare_statement_after_prose_is_found() {
        let raw = "<think>need counts</think>Selecting now. SELECT gender, COUNT(*) AS n FROM hr_employee_attrition GROUP BY gender;";
        assert_eq!(
            extract_query(raw).as_deref(),
            Some("SELECT gender, COUNT(*) AS n FROM hr_employee_attrition GROUP BY gender")
        );
    }

    #[test]
    fn reply_without_query_yields_none() {
        assert_eq!(extract_query("I cannot answer that."), None);
        assert_eq!(extract_query("```sql\n;\n```"), None);
    }
}
