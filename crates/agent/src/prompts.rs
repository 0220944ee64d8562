use insight_core::CapabilityError;
use tera::{Context, Tera};

const CLASSIFY_TEMPLATE: &str = "classify.txt";
const QUERY_TEMPLATE: &str = "query.txt";
const HYPOTHESES_TEMPLATE: &str = "hypotheses.txt";
const CHART_TEMPLATE: &str = "chart.txt";

const CLASSIFY: &str = r#"Classify the analytics question below into exactly one category.

WHAT: the user asks for facts, counts, averages, distributions or comparisons
(what is, how many, show, list, compare, average, distribution).
WHY: the user asks for reasons, causes, effects or relationships
(why, cause, affect, impact, influence, relationship, correlation, hypothesis).

Rules:
- A comparison without causation is WHAT.
- Impact, relationship or hypothesis testing is WHY.
- If unsure, answer WHAT.

Available data:
{{ schema }}

Return only a JSON object:
{"question_type": "WHAT or WHY", "reasoning": "one sentence", "agents_to_call": ["text_to_sql", "visualization"] or ["hypothesis", "statistical_testing"], "analysis_approach": "short description"}

Question: {{ question }}"#;

const QUERY: &str = r#"Write one SQLite SELECT statement that answers the question.

Rules:
- Only SELECT (a leading WITH clause is allowed). Never modify data or schema.
- Use only the table and columns listed below.
- Text values such as attrition and overtime are stored as 'Yes' or 'No'.
- For rates, multiply by 100.0 so the division is not truncated.
- Give computed columns readable aliases.
- Return the SQL inside a ```sql fenced block and nothing else.

Schema:
{{ schema }}

Question: {{ question }}"#;

const HYPOTHESES: &str = r#"Generate {{ count }} testable bivariate hypotheses that help answer the question.

Each hypothesis relates exactly two columns from the schema below and names the test:
- numerical vs numerical: correlation
- categorical vs numerical: t-test (two groups) or anova (three or more groups)
- categorical vs categorical: chi-square

Schema:
{{ schema }}

Return only JSON shaped like:
{"hypotheses": [{"hypothesis_id": 1, "null_hypothesis": "...", "alternative_hypothesis": "...", "variable_1": "column", "variable_2": "column", "variable_1_type": "categorical or numerical", "variable_2_type": "categorical or numerical", "recommended_test": "chi-square, t-test, anova or correlation", "rationale": "..."}]}

Question: {{ question }}"#;

const CHART: &str = r#"Choose one chart for the query result below.

Allowed chart_type values: bar, line, pie, scatter, histogram, indicator.
x, y and color must be column names from the result, or null.

Question: {{ question }}
Columns: {{ columns | join(sep=", ") }}
Row count: {{ row_count }}
Sample rows:
{{ sample }}

Return only JSON: {"chart_type": "...", "title": "...", "x": "...", "y": "...", "color": null}"#;

/// Prompt templates rendered with tera. Templates are compiled once at startup.
#[derive(Debug)]
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (CLASSIFY_TEMPLATE, CLASSIFY),
            (QUERY_TEMPLATE, QUERY),
            (HYPOTHESES_TEMPLATE, HYPOTHESES),
            (CHART_TEMPLATE, CHART),
        ])?;
        Ok(Self { tera })
    }

    pub fn classification(&self, question: &str, schema: &str) -> Result<String, CapabilityError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("schema", schema);
        self.render(CLASSIFY_TEMPLATE, &context)
    }

    pub fn query(&self, question: &str, schema: &str) -> Result<String, CapabilityError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("schema", schema);
        self.render(QUERY_TEMPLATE, &context)
    }

    pub fn hypotheses(
        &self,
        question: &str,
        schema: &str,
        count: usize,
    ) -> Result<String, CapabilityError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("schema", schema);
        context.insert("count", &count);
        self.render(HYPOTHESES_TEMPLATE, &context)
    }

    pub fn chart(
        &self,
        question: &str,
        columns: &[String],
        row_count: usize,
        sample: &str,
    ) -> Result<String, CapabilityError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("columns", columns);
        context.insert("row_count", &row_count);
        context.insert("sample", sample);
        self.render(CHART_TEMPLATE, &context)
    }

    fn render(&self, template: &str, context: &Context) -> Result<String, CapabilityError> {
        self.tera
            .render(template, context)
            .map_err(|error| CapabilityError::unavailable("prompt_templates", error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::PromptLibrary;

    #[test]
    fn all_templates_compile_and_render() {
        let prompts = PromptLibrary::new().expect("templates compile");

        let classify = prompts
            .classification("Why do employees leave?", "hr_employee_attrition(attrition TEXT)")
            .expect("render");
        assert!(classify.contains("Question: Why do employees leave?"));
        assert!(classify.contains("\"question_type\""));

        let query = prompts.query("How many employees?", "schema text").expect("render");
        assert!(query.contains("```sql"));

        let hypotheses = prompts.hypotheses("Why?", "schema text", 4).expect("render");
        assert!(hypotheses.starts_with("Generate 4 testable"));

        let chart = prompts
            .chart("q", &["department".to_owned(), "headcount".to_owned()], 3, "{}")
            .expect("render");
        assert!(chart.contains("Columns: department, headcount"));
    }

    #[test]
    fn question_text_is_not_html_escaped() {
        let prompts = PromptLibrary::new().expect("templates compile");
        let rendered = prompts.query("Research & Development <R&D>", "s").expect("render");
        assert!(rendered.contains("Research & Development <R&D>"));
    }
}
