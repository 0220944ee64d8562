use std::sync::Arc;

use insight_core::{
    AnalysisError, CausalAnswer, ErrorKind, HypothesisGenerator, Question, StatTestResult,
    StatTester,
};
use tracing::{info, warn};

use crate::timeouts::{bounded, Timeouts};

/// Answers WHY questions: generate hypotheses, then test each one.
///
/// A test that fails or times out keeps its slot as a failed result, so the answer
/// always holds exactly one result per hypothesis, in order.
pub struct CausalHandler {
    generator: Arc<dyn HypothesisGenerator>,
    tester: Arc<dyn StatTester>,
    timeouts: Timeouts,
}

impl CausalHandler {
    pub fn new(
        generator: Arc<dyn HypothesisGenerator>,
        tester: Arc<dyn StatTester>,
        timeouts: Timeouts,
    ) -> Self {
        Self { generator, tester, timeouts }
    }

    pub async fn handle(
        &self,
        question: &Question,
        hypothesis_count: usize,
    ) -> Result<CausalAnswer, AnalysisError> {
        let mut hypotheses = bounded(
            "hypothesis_generator",
            self.timeouts.llm,
            self.generator.generate_hypotheses(question.text(), hypothesis_count),
        )
        .await
        .map_err(|error| error.into_analysis(ErrorKind::HypothesisGenerationFailed))?;

        if hypotheses.is_empty() {
            return Err(AnalysisError::new(
                ErrorKind::HypothesisGenerationFailed,
                "no testable hypotheses were generated",
            ));
        }

        hypotheses.truncate(hypothesis_count);
        for (index, hypothesis) in hypotheses.iter_mut().enumerate() {
            hypothesis.id = index as u32 + 1;
        }

        let mut results = Vec::with_capacity(hypotheses.len());
        for hypothesis in &hypotheses {
            let outcome =
                bounded("stat_tester", self.timeouts.stat_test, self.tester.run_test(hypothesis)).await;
            let result = match outcome {
                Ok(result) if result.hypothesis_id() == hypothesis.id => result,
                Ok(result) => StatTestResult::failed(
                    hypothesis,
                    format!("tester answered for hypothesis {}", result.hypothesis_id()),
                ),
                Err(error) => {
                    warn!(
                        event_name = "analysis.causal.test_failed",
                        hypothesis_id = hypothesis.id,
                        error = %error,
                        "significance test failed"
                    );
                    StatTestResult::failed(hypothesis, error.to_string())
                }
            };
            results.push(result);
        }

        let answer = CausalAnswer::new(hypotheses, results)
            .map_err(|error| AnalysisError::new(ErrorKind::HypothesisGenerationFailed, error.to_string()))?;

        info!(
            event_name = "analysis.causal.tests_completed",
            hypotheses = answer.hypotheses().len(),
            significant = answer.significant_count(),
            failed = answer.failed_count(),
            "causal analysis completed"
        );
        Ok(answer)
    }
}
