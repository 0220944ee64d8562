use serde::{Deserialize, Serialize};

use crate::domain::question::QuestionKind;
use crate::errors::ErrorKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Start,
    Validated,
    Classified(QuestionKind),
    RunDescriptive,
    RunCausal,
    Succeeded(QuestionKind),
    Failed(ErrorKind),
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    QuestionValidated,
    ValidationFailed,
    Classified(QuestionKind),
    ClassifierFailed,
    Dispatched,
    Answered,
    HandlerFailed(ErrorKind),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ClassifyQuestion,
    RunDescriptiveHandler,
    RunCausalHandler,
    EmitEnvelope,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
