use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{CapabilityError, ChartRenderer, ChartSpec, ChartType, Scalar, TabularResult};
use serde::Deserialize;

use crate::llm::LlmClient;
use crate::prompts::PromptLibrary;
use crate::text::{json_object, strip_reasoning};

const HEURISTIC: &str = "chart_heuristic";
const PLANNER: &str = "chart_planner";
const SAMPLE_ROWS: usize = 5;
const PIE_MAX_SLICES: usize = 6;

/// Picks a chart from the shape of the result table alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicChartRenderer;

#[async_trait]
impl ChartRenderer for HeuristicChartRenderer {
    async fn render_chart(
        &self,
        table: &TabularResult,
        question: &str,
    ) -> Result<ChartSpec, CapabilityError> {
        plan_from_shape(table, question)
    }
}

/// Column roles inferred from the values a table actually holds.
struct Profile<'a> {
    numeric: Vec<&'a str>,
    categorical: Vec<&'a str>,
}

fn profile(table: &TabularResult) -> Profile<'_> {
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    for column in table.columns() {
        let mut values = table.column_values(column).filter(|value| !value.is_null()).peekable();
        if values.peek().is_none() {
            continue;
        }
        if values.all(Scalar::is_numeric) {
            numeric.push(column.as_str());
        } else {
            categorical.push(column.as_str());
        }
    }

    Profile { numeric, categorical }
}

pub fn plan_from_shape(table: &TabularResult, question: &str) -> Result<ChartSpec, CapabilityError> {
    if table.is_empty() {
        return Err(CapabilityError::rejected(HEURISTIC, "result has no rows to chart"));
    }

    let profile = profile(table);
    let title = title_for(question);

    let spec = match (profile.categorical.as_slice(), profile.numeric.as_slice()) {
        ([], [value]) if table.row_count() == 1 => ChartSpec {
            chart_type: ChartType::Indicator,
            title,
            x: None,
            y: Some((*value).to_owned()),
            color: None,
        },
        ([category, rest @ ..], [value, ..]) => {
            let small_share = table.row_count() <= PIE_MAX_SLICES && looks_like_share(value);
            ChartSpec {
                chart_type: if small_share { ChartType::Pie } else { ChartType::Bar },
                title,
                x: Some((*category).to_owned()),
                y: Some((*value).to_owned()),
                color: rest.first().map(|column| (*column).to_owned()),
            }
        }
        ([], [x, y, ..]) => ChartSpec {
            chart_type: ChartType::Scatter,
            title,
            x: Some((*x).to_owned()),
            y: Some((*y).to_owned()),
            color: None,
        },
        ([], [value]) => ChartSpec {
            chart_type: ChartType::Histogram,
            title,
            x: Some((*value).to_owned()),
            y: None,
            color: None,
        },
        (_, []) => {
            return Err(CapabilityError::rejected(HEURISTIC, "result has no numeric column to plot"))
        }
    };

    Ok(spec)
}

fn looks_like_share(column: &str) -> bool {
    let lowered = column.to_ascii_lowercase();
    ["percent", "pct", "share", "proportion"].iter().any(|marker| lowered.contains(marker))
}

fn title_for(question: &str) -> String {
    let trimmed = question.trim().trim_end_matches('?').trim();
    if trimmed.is_empty() {
        "Query result".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Asks a chat model for a chart and checks its answer against the table. Falls back
/// to [`plan_from_shape`] when the model names columns the table does not have.
pub struct LlmChartPlanner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmChartPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }
}

#[derive(Debug, Deserialize)]
struct ChartReply {
    chart_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[async_trait]
impl ChartRenderer for LlmChartPlanner {
    async fn render_chart(
        &self,
        table: &TabularResult,
        question: &str,
    ) -> Result<ChartSpec, CapabilityError> {
        if table.is_empty() {
            return Err(CapabilityError::rejected(PLANNER, "result has no rows to chart"));
        }

        let sample = table
            .rows()
            .iter()
            .take(SAMPLE_ROWS)
            .map(|row| serde_json::to_string(row).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = self.prompts.chart(question, table.columns(), table.row_count(), &sample)?;
        let raw = self.llm.complete(&prompt).await?;

        match parse_chart_reply(&raw, table, question) {
            Ok(spec) => Ok(spec),
            Err(_) => plan_from_shape(table, question),
        }
    }
}

pub fn parse_chart_reply(
    raw: &str,
    table: &TabularResult,
    question: &str,
) -> Result<ChartSpec, CapabilityError> {
    let cleaned = strip_reasoning(raw);
    let reply = json_object(&cleaned)
        .and_then(|object| serde_json::from_str::<ChartReply>(object).ok())
        .ok_or_else(|| CapabilityError::invalid_output(PLANNER, "reply did not contain a chart object"))?;

    let chart_type = ChartType::parse_label(&reply.chart_type).ok_or_else(|| {
        CapabilityError::invalid_output(PLANNER, format!("unsupported chart type `{}`", reply.chart_type))
    })?;

    let spec = ChartSpec {
        chart_type,
        title: reply
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| title_for(question)),
        x: column_ref(reply.x),
        y: column_ref(reply.y),
        color: column_ref(reply.color),
    };

    if let Some(unknown) =
        spec.encoded_columns().find(|column| !table.columns().iter().any(|known| known == column))
    {
        return Err(CapabilityError::invalid_output(
            PLANNER,
            format!("chart references unknown column `{unknown}`"),
        ));
    }

    Ok(spec)
}

fn column_ref(value: Option<String>) -> Option<String> {
    value
        .map(|column| column.trim().to_owned())
        .filter(|column| !column.is_empty() && !column.eq_ignore_ascii_case("null"))
}

#[cfg(test)]
mod tests {
    use insight_core::{ChartType, Scalar, TabularResult};

    use super::{parse_chart_reply, plan_from_shape};

    fn table(columns: &[&str], records: Vec<Vec<Scalar>>) -> TabularResult {
        TabularResult::from_records(
            "SELECT ...",
            columns.iter().map(|column| (*column).to_owned()).collect(),
            records,
        )
        .expect("valid table")
    }

    #[test]
    fn category_and_value_become_a_bar_chart() {
        let result = table(
            &["department", "attrition_rate"],
            vec![
                vec![Scalar::from("Sales"), Scalar::Real(20.6)],
                vec![Scalar::from("Research & Development"), Scalar::Real(13.8)],
                vec![Scalar::from("Human Resources"), Scalar::Real(19.0)],
            ],
        );
        let spec = plan_from_shape(&result, "What is the attrition rate by department?").expect("chart");

        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.x.as_deref(), Some("department"));
        assert_eq!(spec.y.as_deref(), Some("attrition_rate"));
        assert_eq!(spec.title, "What is the attrition rate by department");
    }

    #[test]
    fn single_value_becomes_an_indicator() {
        let result = table(&["average_income"], vec![vec![Scalar::Real(6502.9)]]);
        assert_eq!(plan_from_shape(&result, "q").expect("chart").chart_type, ChartType::Indicator);
    }

    #[test]
    fn numeric_pairs_become_a_scatter_and_single_series_a_histogram() {
        let pairs = table(
            &["age", "monthlyincome"],
            vec![vec![Scalar::Integer(30), Scalar::Integer(4000)], vec![Scalar::Integer(45), Scalar::Integer(9000)]],
        );
        assert_eq!(plan_from_shape(&pairs, "q").expect("chart").chart_type, ChartType::Scatter);

        let series = table(&["age"], vec![vec![Scalar::Integer(30)], vec![Scalar::Integer(41)]]);
        assert_eq!(plan_from_shape(&series, "q").expect("chart").chart_type, ChartType::Histogram);
    }

    #[test]
    fn text_only_and_empty_results_cannot_be_charted() {
        let text_only = table(&["jobrole"], vec![vec![Scalar::from("Manager")]]);
        assert!(plan_from_shape(&text_only, "q").is_err());

        let empty = table(&["department", "headcount"], vec![]);
        assert!(plan_from_shape(&empty, "q").is_err());
    }

    #[test]
    fn model_reply_must_reference_known_columns() {
        let result = table(&["gender", "headcount"], vec![vec![Scalar::from("Male"), Scalar::Integer(30)]]);

        let spec = parse_chart_reply(
            r#"{"chart_type": "pie", "title": "Headcount by gender", "x": "gender", "y": "headcount", "color": null}"#,
            &result,
            "q",
        )
        .expect("valid");
        assert_eq!(spec.chart_type, ChartType::Pie);
        assert_eq!(spec.color, None);

        let unknown = parse_chart_reply(r#"{"chart_type": "bar", "x": "dept", "y": "headcount"}"#, &result, "q");
        assert!(unknown.is_err());

        let unsupported = parse_chart_reply(r#"{"chart_type": "sankey"}"#, &result, "q");
        assert!(unsupported.is_err());
    }
}
