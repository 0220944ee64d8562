use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use insight_agent::{AnalysisOrchestrator, AnalysisRequest};
use insight_core::{Classification, InterfaceError, ResponseEnvelope};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnalyzeBody {
    pub question: String,
    #[serde(default, alias = "includeVisualization")]
    pub include_visualization: Option<bool>,
    #[serde(default, alias = "hypothesisCount")]
    pub hypothesis_count: Option<usize>,
}

/// Wire shape of one analysis. The envelope is flattened so `question_type`
/// sits at the top level next to the request metadata.
#[derive(Clone, Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub question: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner_decision: Option<Classification>,
    #[serde(flatten)]
    pub envelope: ResponseEnvelope,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self {
            error: error.user_message().to_owned(),
            detail: error.to_string(),
            correlation_id: error.correlation_id().to_owned(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new().route("/api/analyze", post(analyze)).with_state(state)
}

/// Every well-formed body gets a 200 with an envelope, including analysis
/// errors; only transport failures use other status codes.
pub async fn analyze(
    State(state): State<ApiState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(body) = body.map_err(|rejection| {
        warn!(
            event_name = "api.analyze.rejected",
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "analysis request body rejected"
        );
        let interface = InterfaceError::BadRequest {
            message: rejection.body_text(),
            correlation_id: correlation_id.clone(),
        };
        (StatusCode::BAD_REQUEST, Json(ApiError::from(interface)))
    })?;

    let mut request = AnalysisRequest::new(body.question).with_correlation_id(correlation_id);
    request.include_visualization = body.include_visualization;
    request.hypothesis_count = body.hypothesis_count;

    let outcome = state.orchestrator.run(request).await;
    Ok(Json(AnalyzeResponse {
        success: outcome.envelope.is_success(),
        question: outcome.question,
        correlation_id: outcome.correlation_id,
        planner_decision: outcome.classification,
        envelope: outcome.envelope,
    }))
}
