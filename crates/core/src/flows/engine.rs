use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::question::QuestionKind;
use crate::errors::ErrorKind;
use crate::flows::states::{FlowAction, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Single-shot request lifecycle: validate, classify, dispatch to one handler,
/// finish in exactly one terminal state.
#[derive(Clone, Debug, Default)]
pub struct AnalysisFlow;

impl FlowDefinition for AnalysisFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Start
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_analysis(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                let outcome_tag = match outcome.to {
                    FlowState::Failed(_) => AuditOutcome::Failed,
                    _ => AuditOutcome::Success,
                };
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        category_for(&outcome.to),
                        audit.actor.clone(),
                        outcome_tag,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<AnalysisFlow> {
    fn default() -> Self {
        Self::new(AnalysisFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("request already finished in {state:?}; event {event:?} is not accepted")]
    AlreadyTerminal { state: FlowState, event: FlowEvent },
    #[error("{kind} is not a failure the handler running in {state:?} can report")]
    UnexpectedFailureKind { state: FlowState, kind: ErrorKind },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn category_for(state: &FlowState) -> AuditCategory {
    match state {
        FlowState::Start | FlowState::Validated => AuditCategory::Ingress,
        FlowState::Classified(_) => AuditCategory::Classification,
        FlowState::RunDescriptive | FlowState::Succeeded(QuestionKind::Descriptive) => {
            AuditCategory::Descriptive
        }
        FlowState::RunCausal | FlowState::Succeeded(QuestionKind::Causal) => AuditCategory::Causal,
        FlowState::Failed(_) => AuditCategory::Flow,
    }
}

fn descriptive_failure(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::QueryGenerationFailed | ErrorKind::UnsafeQuery | ErrorKind::QueryExecutionFailed
    )
}

fn causal_failure(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::HypothesisGenerationFailed)
}

fn transition_analysis(
    current: &FlowState,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{ClassifyQuestion, EmitEnvelope, RunCausalHandler, RunDescriptiveHandler};
    use FlowEvent::{
        Answered, Classified, ClassifierFailed, Dispatched, HandlerFailed, QuestionValidated,
        ValidationFailed,
    };
    use FlowState::{Failed, RunCausal, RunDescriptive, Start, Succeeded, Validated};

    if current.is_terminal() {
        return Err(FlowTransitionError::AlreadyTerminal {
            state: current.clone(),
            event: event.clone(),
        });
    }

    let (to, actions) = match (current, event) {
        (Start, QuestionValidated) => (Validated, vec![ClassifyQuestion]),
        (Start, ValidationFailed) | (Validated, ValidationFailed) => {
            (Failed(ErrorKind::InvalidInput), vec![EmitEnvelope])
        }
        (Validated, Classified(kind)) => {
            let action = match kind {
                QuestionKind::Descriptive => RunDescriptiveHandler,
                QuestionKind::Causal => RunCausalHandler,
            };
            (FlowState::Classified(*kind), vec![action])
        }
        (Start, ClassifierFailed) | (Validated, ClassifierFailed) => {
            (Failed(ErrorKind::ClassifierUnavailable), vec![EmitEnvelope])
        }
        (FlowState::Classified(QuestionKind::Descriptive), Dispatched) => {
            (RunDescriptive, Vec::new())
        }
        (FlowState::Classified(QuestionKind::Causal), Dispatched) => (RunCausal, Vec::new()),
        (RunDescriptive, Answered) => (Succeeded(QuestionKind::Descriptive), vec![EmitEnvelope]),
        (RunCausal, Answered) => (Succeeded(QuestionKind::Causal), vec![EmitEnvelope]),
        (RunDescriptive, HandlerFailed(kind)) | (RunCausal, HandlerFailed(kind)) => {
            let allowed = match current {
                RunDescriptive => descriptive_failure(*kind),
                _ => causal_failure(*kind),
            };
            if !allowed {
                return Err(FlowTransitionError::UnexpectedFailureKind {
                    state: current.clone(),
                    kind: *kind,
                });
            }
            (Failed(*kind), vec![EmitEnvelope])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::question::QuestionKind;
    use crate::errors::ErrorKind;
    use crate::flows::engine::{AnalysisFlow, FlowEngine, FlowTransitionError};
    use crate::flows::states::{FlowAction, FlowEvent, FlowState};

    fn run(engine: &FlowEngine<AnalysisFlow>, events: &[FlowEvent]) -> FlowState {
        let mut state = engine.initial_state();
        for event in events {
            state = engine.apply(&state, event).expect("valid transition").to;
        }
        state
    }

    #[test]
    fn descriptive_happy_path() {
        let engine = FlowEngine::default();
        let state = run(
            &engine,
            &[
                FlowEvent::QuestionValidated,
                FlowEvent::Classified(QuestionKind::Descriptive),
                FlowEvent::Dispatched,
                FlowEvent::Answered,
            ],
        );
        assert_eq!(state, FlowState::Succeeded(QuestionKind::Descriptive));
    }

    #[test]
    fn causal_classification_schedules_causal_handler() {
        let engine = FlowEngine::new(AnalysisFlow);
        let outcome = engine
            .apply(&FlowState::Validated, &FlowEvent::Classified(QuestionKind::Causal))
            .expect("validated -> classified");

        assert_eq!(outcome.to, FlowState::Classified(QuestionKind::Causal));
        assert_eq!(outcome.actions, vec![FlowAction::RunCausalHandler]);

        let running = engine.apply(&outcome.to, &FlowEvent::Dispatched).expect("dispatch").to;
        assert_eq!(running, FlowState::RunCausal);
    }

    #[test]
    fn empty_question_ends_in_invalid_input() {
        let engine = FlowEngine::default();
        let state = run(&engine, &[FlowEvent::ValidationFailed]);
        assert_eq!(state, FlowState::Failed(ErrorKind::InvalidInput));
    }

    #[test]
    fn classifier_failure_never_reaches_a_handler() {
        let engine = FlowEngine::default();
        let state = run(&engine, &[FlowEvent::QuestionValidated, FlowEvent::ClassifierFailed]);
        assert_eq!(state, FlowState::Failed(ErrorKind::ClassifierUnavailable));

        let error = engine.apply(&state, &FlowEvent::Dispatched).expect_err("terminal state");
        assert!(matches!(error, FlowTransitionError::AlreadyTerminal { .. }));
    }

    #[test]
    fn handlers_may_only_report_their_own_failures() {
        let engine = FlowEngine::default();

        let unsafe_query = engine
            .apply(&FlowState::RunDescriptive, &FlowEvent::HandlerFailed(ErrorKind::UnsafeQuery))
            .expect("descriptive path can reject unsafe queries");
        assert_eq!(unsafe_query.to, FlowState::Failed(ErrorKind::UnsafeQuery));

        let error = engine
            .apply(
                &FlowState::RunCausal,
                &FlowEvent::HandlerFailed(ErrorKind::QueryExecutionFailed),
            )
            .expect_err("causal path does not execute queries");
        assert!(matches!(
            error,
            FlowTransitionError::UnexpectedFailureKind {
                state: FlowState::RunCausal,
                kind: ErrorKind::QueryExecutionFailed
            }
        ));
    }

    #[test]
    fn dispatch_before_classification_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&FlowState::Validated, &FlowEvent::Dispatched)
            .expect_err("must classify before dispatch");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn audited_transitions_record_correlation_and_outcome() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new("req-42", "orchestrator");

        let validated = engine
            .apply_with_audit(&FlowState::Start, &FlowEvent::QuestionValidated, &sink, &audit)
            .expect("start -> validated");
        engine
            .apply_with_audit(&validated.to, &FlowEvent::ClassifierFailed, &sink, &audit)
            .expect("validated -> failed");
        let _ = engine.apply_with_audit(
            &FlowState::Failed(ErrorKind::ClassifierUnavailable),
            &FlowEvent::Answered,
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|event| event.correlation_id == "req-42"));
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[1].outcome, AuditOutcome::Failed);
        assert_eq!(events[2].event_type, "flow.transition_rejected");
        assert_eq!(events[2].outcome, AuditOutcome::Rejected);
    }
}
