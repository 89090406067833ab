pub mod engine;
pub mod states;

pub use engine::{
    FlowDefinition, FlowEngine, FlowTransitionError, FraudReportFlow, OrderPlacementFlow,
    RecommendationFlow,
};
pub use states::{
    FlowType, FraudEvent, FraudPhase, OrderPlacementEvent, OrderPlacementPhase,
    RecommendationEvent, RecommendationPhase, TransitionOutcome,
};
