//! Analysis runtime - question routing and the collaborators behind it
//!
//! This crate turns a free-text HR analytics question into one response envelope:
//! - Classifies the question as descriptive (WHAT) or causal (WHY)
//! - Descriptive path: text-to-SQL, read-only query check, execution, optional chart
//! - Causal path: hypothesis generation and significance testing per hypothesis
//!
//! # Safety Principle
//!
//! The language model only drafts text. Whether a query may run, which test is
//! applied and what counts as significant are decided by deterministic code here.

pub mod audit;
pub mod causal;
pub mod charts;
pub mod classifier;
pub mod descriptive;
pub mod guardrails;
pub mod hypotheses;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod sql;
pub mod stats;
pub mod text;
pub mod timeouts;

pub use audit::TracingAuditSink;
pub use causal::CausalHandler;
pub use charts::{HeuristicChartRenderer, LlmChartPlanner};
pub use classifier::{normalize_classification, QuestionClassifier};
pub use descriptive::DescriptiveHandler;
pub use guardrails::{QueryGuard, QueryVerdict};
pub use hypotheses::LlmHypothesisGenerator;
pub use llm::{LlmClient, OpenAiCompatibleClient};
pub use prompts::PromptLibrary;
pub use runtime::{
    AnalysisOrchestrator, AnalysisOutcome, AnalysisRequest, Collaborators, OrchestratorSettings,
};
pub use sql::LlmQueryGenerator;
pub use stats::DatasetStatTester;
pub use timeouts::Timeouts;
