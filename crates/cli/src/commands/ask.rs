use std::sync::Arc;

use insight_agent::{AnalysisOrchestrator, AnalysisRequest, TracingAuditSink};
use insight_core::ResponseEnvelope;
use insight_db::{load_dataset, SqlDataSource, HR_SCHEMA_DESCRIPTION};
use serde::Serialize;

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, Failure};

/// Printed on stdout; mirrors the HTTP response body.
#[derive(Debug, Serialize)]
struct AskOutput {
    success: bool,
    question: String,
    correlation_id: String,
    #[serde(flatten)]
    envelope: ResponseEnvelope,
}

pub fn run(question: &str, include_visualization: bool, hypothesis_count: Option<usize>) -> CommandResult {
    match execute(question, include_visualization, hypothesis_count) {
        Ok(output) => {
            let exit_code = if output.success { 0 } else { 1 };
            match serde_json::to_string_pretty(&output) {
                Ok(rendered) => CommandResult { exit_code, output: rendered },
                Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 7),
            }
        }
        Err(failure) => CommandResult::from_failure("ask", failure),
    }
}

fn execute(
    question: &str,
    include_visualization: bool,
    hypothesis_count: Option<usize>,
) -> Result<AskOutput, Failure> {
    let config = load_config()?;
    runtime()?.block_on(async {
        let pool = migrated_pool(&config).await?;
        let dataset = load_dataset(&pool)
            .await
            .map_err(|error| ("dataset_load", error.to_string(), 6u8))?;

        let schema = config
            .analysis
            .schema_description
            .clone()
            .unwrap_or_else(|| HR_SCHEMA_DESCRIPTION.to_owned());
        let orchestrator = AnalysisOrchestrator::from_config(
            &config,
            Arc::new(SqlDataSource::new(pool.clone())),
            Arc::new(dataset),
            &schema,
            Arc::new(TracingAuditSink),
        )
        .map_err(|error| ("runtime_assembly", error.to_string(), 6u8))?;

        let mut request =
            AnalysisRequest::new(question).with_visualization(include_visualization).with_actor("cli");
        request.hypothesis_count = hypothesis_count;
        let outcome = orchestrator.run(request).await;
        pool.close().await;

        Ok::<_, Failure>(AskOutput {
            success: outcome.envelope.is_success(),
            question: outcome.question,
            correlation_id: outcome.correlation_id,
            envelope: outcome.envelope,
        })
    })
}
