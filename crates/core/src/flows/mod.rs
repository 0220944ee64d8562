pub mod engine;
pub mod states;

pub use engine::{AnalysisFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowAction, FlowEvent, FlowState, TransitionOutcome};
