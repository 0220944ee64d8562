//! Seams to the external collaborators the analysis core depends on.
//!
//! Implementations own their transport, retries and prompt wording. The core only
//! relies on the signatures below and on failures being reported as
//! [`CapabilityError`].

use async_trait::async_trait;

use crate::domain::chart::ChartSpec;
use crate::domain::hypothesis::Hypothesis;
use crate::domain::stat_test::StatTestResult;
use crate::domain::table::TabularResult;
use crate::errors::CapabilityError;

/// Free-text completion used to classify questions.
#[async_trait]
pub trait ClassifierCapability: Send + Sync {
    async fn classify_text(&self, prompt: &str) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate_query(
        &self,
        question: &str,
        schema_description: &str,
    ) -> Result<String, CapabilityError>;
}

/// Read-only query execution. Only ever receives statements that passed the
/// query guard.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn execute(&self, query: &str) -> Result<TabularResult, CapabilityError>;
}

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render_chart(
        &self,
        table: &TabularResult,
        question: &str,
    ) -> Result<ChartSpec, CapabilityError>;
}

#[async_trait]
pub trait HypothesisGenerator: Send + Sync {
    async fn generate_hypotheses(
        &self,
        question: &str,
        count: usize,
    ) -> Result<Vec<Hypothesis>, CapabilityError>;
}

#[async_trait]
pub trait StatTester: Send + Sync {
    async fn run_test(&self, hypothesis: &Hypothesis) -> Result<StatTestResult, CapabilityError>;
}
