use std::sync::Arc;
use std::time::Instant;

use insight_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use insight_core::config::{
    AnalysisConfig, AppConfig, ChartRendererKind, MAX_HYPOTHESIS_COUNT_LIMIT,
};
use insight_core::flows::{AnalysisFlow, FlowEngine, FlowEvent, FlowState};
use insight_core::{
    AnalysisError, CapabilityError, ChartRenderer, Classification, ClassifierCapability,
    DataSource, Dataset, HypothesisGenerator, Question, QuestionKind, QueryGenerator,
    ResponseEnvelope, StatTester,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::causal::CausalHandler;
use crate::charts::{HeuristicChartRenderer, LlmChartPlanner};
use crate::classifier::QuestionClassifier;
use crate::descriptive::DescriptiveHandler;
use crate::hypotheses::LlmHypothesisGenerator;
use crate::llm::{LlmClient, OpenAiCompatibleClient};
use crate::prompts::PromptLibrary;
use crate::sql::LlmQueryGenerator;
use crate::stats::DatasetStatTester;
use crate::timeouts::Timeouts;

const DEFAULT_ACTOR: &str = "anonymous";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub default_hypothesis_count: usize,
    pub max_hypothesis_count: usize,
    pub include_visualization: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            default_hypothesis_count: config.default_hypothesis_count,
            max_hypothesis_count: config.max_hypothesis_count.min(MAX_HYPOTHESIS_COUNT_LIMIT),
            include_visualization: config.include_visualization,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default().analysis)
    }
}

/// The external collaborators an orchestrator is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn ClassifierCapability>,
    pub query_generator: Arc<dyn QueryGenerator>,
    pub data_source: Arc<dyn DataSource>,
    pub chart_renderer: Arc<dyn ChartRenderer>,
    pub hypothesis_generator: Arc<dyn HypothesisGenerator>,
    pub stat_tester: Arc<dyn StatTester>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub question: String,
    #[serde(default)]
    pub include_visualization: Option<bool>,
    #[serde(default)]
    pub hypothesis_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AnalysisRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            include_visualization: None,
            hypothesis_count: None,
            correlation_id: None,
            actor: None,
        }
    }

    pub fn with_visualization(mut self, include: bool) -> Self {
        self.include_visualization = Some(include);
        self
    }

    pub fn with_hypothesis_count(mut self, count: usize) -> Self {
        self.hypothesis_count = Some(count);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Envelope plus the request metadata a transport may want to echo back.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisOutcome {
    pub correlation_id: String,
    pub question: String,
    pub classification: Option<Classification>,
    pub envelope: ResponseEnvelope,
    pub final_state: FlowState,
}

/// Routes one question to the descriptive or causal path and always answers with a
/// [`ResponseEnvelope`]. Holds no per-request state, so one instance serves
/// concurrent requests.
pub struct AnalysisOrchestrator {
    classifier: QuestionClassifier,
    descriptive: DescriptiveHandler,
    causal: CausalHandler,
    engine: FlowEngine<AnalysisFlow>,
    audit: Arc<dyn AuditSink>,
    settings: OrchestratorSettings,
}

impl AnalysisOrchestrator {
    pub fn new(
        classifier: QuestionClassifier,
        descriptive: DescriptiveHandler,
        causal: CausalHandler,
        audit: Arc<dyn AuditSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { classifier, descriptive, causal, engine: FlowEngine::default(), audit, settings }
    }

    pub fn assemble(
        collaborators: Collaborators,
        prompts: Arc<PromptLibrary>,
        schema_description: &str,
        timeouts: Timeouts,
        settings: OrchestratorSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let classifier = QuestionClassifier::new(
            collaborators.classifier,
            prompts,
            schema_description,
            timeouts.llm,
        );
        let descriptive = DescriptiveHandler::new(
            collaborators.query_generator,
            collaborators.data_source,
            collaborators.chart_renderer,
            schema_description,
            timeouts,
        );
        let causal =
            CausalHandler::new(collaborators.hypothesis_generator, collaborators.stat_tester, timeouts);
        Self::new(classifier, descriptive, causal, audit, settings)
    }

    /// Production wiring: one OpenAI-compatible client backs every language-model
    /// collaborator, the data source and dataset come from the caller.
    pub fn from_config(
        config: &AppConfig,
        data_source: Arc<dyn DataSource>,
        dataset: Arc<Dataset>,
        schema_description: &str,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, CapabilityError> {
        let client = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
        let llm: Arc<dyn LlmClient> = client.clone();
        let prompts = Arc::new(
            PromptLibrary::new()
                .map_err(|error| CapabilityError::rejected("prompts", error.to_string()))?,
        );

        let chart_renderer: Arc<dyn ChartRenderer> = match config.analysis.chart_renderer {
            ChartRendererKind::Heuristic => Arc::new(HeuristicChartRenderer),
            ChartRendererKind::Llm => Arc::new(LlmChartPlanner::new(llm.clone(), prompts.clone())),
        };
        let collaborators = Collaborators {
            classifier: client,
            query_generator: Arc::new(LlmQueryGenerator::new(llm.clone(), prompts.clone())),
            data_source,
            chart_renderer,
            hypothesis_generator: Arc::new(LlmHypothesisGenerator::new(
                llm,
                prompts.clone(),
                schema_description,
            )),
            stat_tester: Arc::new(DatasetStatTester::new(dataset)),
        };

        Ok(Self::assemble(
            collaborators,
            prompts,
            schema_description,
            Timeouts::from_config(config),
            OrchestratorSettings::from_config(&config.analysis),
            audit,
        ))
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub async fn analyze(
        &self,
        question: &str,
        include_visualization: bool,
        hypothesis_count: Option<usize>,
    ) -> ResponseEnvelope {
        let mut request = AnalysisRequest::new(question).with_visualization(include_visualization);
        request.hypothesis_count = hypothesis_count;
        self.run(request).await.envelope
    }

    pub async fn run(&self, request: AnalysisRequest) -> AnalysisOutcome {
        let started = Instant::now();
        let correlation_id =
            request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let audit = AuditContext::new(
            correlation_id.clone(),
            request.actor.clone().unwrap_or_else(|| DEFAULT_ACTOR.to_owned()),
        );

        info!(
            event_name = "analysis.request.received",
            correlation_id = %correlation_id,
            question_chars = request.question.chars().count(),
            "analysis request received"
        );

        let mut state = self.engine.initial_state();
        let mut classification = None;
        let envelope = self.drive(&request, &audit, &mut state, &mut classification).await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (outcome, error_kind) = match envelope.error_kind() {
            Some(kind) => (AuditOutcome::Failed, kind.as_str()),
            None => (AuditOutcome::Success, ""),
        };
        self.audit.emit(
            AuditEvent::new(
                correlation_id.clone(),
                "analysis.completed",
                AuditCategory::System,
                audit.actor.clone(),
                outcome,
            )
            .with_metadata("question_type", envelope.discriminant())
            .with_metadata("duration_ms", duration_ms.to_string()),
        );

        if envelope.is_success() {
            info!(
                event_name = "analysis.completed",
                correlation_id = %correlation_id,
                question_type = envelope.discriminant(),
                duration_ms,
                "analysis completed"
            );
        } else {
            warn!(
                event_name = "analysis.completed",
                correlation_id = %correlation_id,
                question_type = envelope.discriminant(),
                error_kind,
                duration_ms,
                "analysis finished with an error envelope"
            );
        }

        AnalysisOutcome {
            correlation_id,
            question: request.question.trim().to_owned(),
            classification,
            envelope,
            final_state: state,
        }
    }

    async fn drive(
        &self,
        request: &AnalysisRequest,
        audit: &AuditContext,
        state: &mut FlowState,
        classification_slot: &mut Option<Classification>,
    ) -> ResponseEnvelope {
        let validated = Question::parse(&request.question)
            .and_then(|question| Ok((question, self.hypothesis_count(request.hypothesis_count)?)));
        let (question, hypothesis_count) = match validated {
            Ok(validated) => validated,
            Err(error) => {
                self.advance(state, FlowEvent::ValidationFailed, audit);
                return error.into();
            }
        };
        self.advance(state, FlowEvent::QuestionValidated, audit);

        let classification = match self.classifier.classify(&question).await {
            Ok(classification) => classification,
            Err(error) => {
                self.advance(state, FlowEvent::ClassifierFailed, audit);
                return error.into();
            }
        };
        info!(
            event_name = "analysis.classified",
            correlation_id = %audit.correlation_id,
            question_type = classification.kind.label(),
            "question classified"
        );
        let kind = classification.kind;
        *classification_slot = Some(classification);

        self.advance(state, FlowEvent::Classified(kind), audit);
        self.advance(state, FlowEvent::Dispatched, audit);

        let include_visualization =
            request.include_visualization.unwrap_or(self.settings.include_visualization);
        let answer = match kind {
            QuestionKind::Descriptive => self
                .descriptive
                .handle(&question, include_visualization)
                .await
                .map(ResponseEnvelope::from),
            QuestionKind::Causal => {
                self.causal.handle(&question, hypothesis_count).await.map(ResponseEnvelope::from)
            }
        };

        match answer {
            Ok(envelope) => {
                self.advance(state, FlowEvent::Answered, audit);
                envelope
            }
            Err(error) => {
                self.advance(state, FlowEvent::HandlerFailed(error.kind), audit);
                error.into()
            }
        }
    }

    fn hypothesis_count(&self, requested: Option<usize>) -> Result<usize, AnalysisError> {
        let count = requested.unwrap_or(self.settings.default_hypothesis_count);
        if count == 0 || count > self.settings.max_hypothesis_count {
            return Err(AnalysisError::invalid_input(format!(
                "hypothesis_count must be between 1 and {}, got {count}",
                self.settings.max_hypothesis_count
            )));
        }
        Ok(count)
    }

    fn advance(&self, state: &mut FlowState, event: FlowEvent, audit: &AuditContext) {
        match self.engine.apply_with_audit(state, &event, self.audit.as_ref(), audit) {
            Ok(outcome) => *state = outcome.to,
            Err(rejection) => error!(
                event_name = "analysis.flow.transition_rejected",
                correlation_id = %audit.correlation_id,
                error = %rejection,
                "request lifecycle rejected a transition"
            ),
        }
    }
}
