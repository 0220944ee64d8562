use std::sync::Arc;

use insight_core::{
    AnalysisError, ChartDescriptor, ChartRenderer, DataSource, DescriptiveAnswer, ErrorKind,
    Question, QueryGenerator, TabularResult,
};
use tracing::{info, warn};

use crate::guardrails::{QueryGuard, QueryVerdict};
use crate::timeouts::{bounded, Timeouts};

/// Answers WHAT questions: generate a query, check it, run it, and optionally chart
/// the result.
pub struct DescriptiveHandler {
    generator: Arc<dyn QueryGenerator>,
    data_source: Arc<dyn DataSource>,
    chart_renderer: Arc<dyn ChartRenderer>,
    guard: QueryGuard,
    schema_description: String,
    timeouts: Timeouts,
}

impl DescriptiveHandler {
    pub fn new(
        generator: Arc<dyn QueryGenerator>,
        data_source: Arc<dyn DataSource>,
        chart_renderer: Arc<dyn ChartRenderer>,
        schema_description: impl Into<String>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            generator,
            data_source,
            chart_renderer,
            guard: QueryGuard,
            schema_description: schema_description.into(),
            timeouts,
        }
    }

    pub async fn handle(
        &self,
        question: &Question,
        include_visualization: bool,
    ) -> Result<DescriptiveAnswer, AnalysisError> {
        let query = bounded(
            "query_generator",
            self.timeouts.llm,
            self.generator.generate_query(question.text(), &self.schema_description),
        )
        .await
        .map_err(|error| error.into_analysis(ErrorKind::QueryGenerationFailed))?;

        let query = query.trim();
        if query.is_empty() {
            return Err(AnalysisError::new(ErrorKind::QueryGenerationFailed, "generated query is empty"));
        }

        if let QueryVerdict::Deny { reason_code, reason } = self.guard.evaluate(query) {
            warn!(
                event_name = "analysis.descriptive.query_blocked",
                reason_code,
                "generated query failed the read-only check"
            );
            return Err(AnalysisError::new(ErrorKind::UnsafeQuery, reason));
        }

        let table = bounded("data_source", self.timeouts.query, self.data_source.execute(query))
            .await
            .map_err(|error| error.into_analysis(ErrorKind::QueryExecutionFailed))?;

        info!(
            event_name = "analysis.descriptive.query_executed",
            row_count = table.row_count(),
            column_count = table.columns().len(),
            "descriptive query executed"
        );

        let chart = if include_visualization {
            Some(self.chart(&table, question).await)
        } else {
            None
        };

        Ok(DescriptiveAnswer::new(table, chart))
    }

    async fn chart(&self, table: &TabularResult, question: &Question) -> ChartDescriptor {
        let render = self.chart_renderer.render_chart(table, question.text());
        match bounded("chart_renderer", self.timeouts.llm, render).await {
            Ok(spec) => ChartDescriptor::Rendered(spec),
            Err(error) => {
                warn!(
                    event_name = "analysis.descriptive.chart_failed",
                    error = %error,
                    "chart step failed; returning table without chart"
                );
                ChartDescriptor::failed(error.to_string())
            }
        }
    }
}
