use std::fmt::Debug;

use thiserror::Error;

use crate::flows::states::{
    FlowType, FraudEvent, FraudPhase, OrderPlacementEvent, OrderPlacementPhase,
    RecommendationEvent, RecommendationPhase, TransitionOutcome,
};

/// A closed phase machine. Phases only move forward; `ResetRequested` is the
/// single way back to the initial phase.
pub trait FlowDefinition {
    type State: Clone + Debug + PartialEq;
    type Event: Clone + Debug;

    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> Self::State;
    fn transition(
        &self,
        current: &Self::State,
        event: &Self::Event,
    ) -> Result<TransitionOutcome<Self::State, Self::Event>, FlowTransitionError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid {flow:?} transition from {state} using event {event}")]
    InvalidTransition { flow: FlowType, state: String, event: String },
}

#[derive(Clone, Debug, Default)]
pub struct RecommendationFlow;

#[derive(Clone, Debug, Default)]
pub struct OrderPlacementFlow;

#[derive(Clone, Debug, Default)]
pub struct FraudReportFlow;

impl FlowDefinition for RecommendationFlow {
    type State = RecommendationPhase;
    type Event = RecommendationEvent;

    fn flow_type(&self) -> FlowType {
        FlowType::Recommendation
    }

    fn initial_state(&self) -> RecommendationPhase {
        RecommendationPhase::Gathering
    }

    fn transition(
        &self,
        current: &RecommendationPhase,
        event: &RecommendationEvent,
    ) -> Result<TransitionOutcome<RecommendationPhase, RecommendationEvent>, FlowTransitionError>
    {
        use RecommendationEvent::{
            DissatisfactionReported, ReadinessReached, RecommendationsDelivered, ResetRequested,
        };
        use RecommendationPhase::{Gathering, Provided, Ready};

        let to = match (current, event) {
            (Gathering, ReadinessReached) | (Provided, ReadinessReached) => Ready,
            (Ready, RecommendationsDelivered) => Provided,
            (Provided, DissatisfactionReported) => Gathering,
            (_, ResetRequested) => Gathering,
            _ => return Err(invalid(self.flow_type(), current, event)),
        };

        Ok(TransitionOutcome { from: *current, to, event: *event })
    }
}

impl FlowDefinition for OrderPlacementFlow {
    type State = OrderPlacementPhase;
    type Event = OrderPlacementEvent;

    fn flow_type(&self) -> FlowType {
        FlowType::OrderPlacement
    }

    fn initial_state(&self) -> OrderPlacementPhase {
        OrderPlacementPhase::Init
    }

    fn transition(
        &self,
        current: &OrderPlacementPhase,
        event: &OrderPlacementEvent,
    ) -> Result<TransitionOutcome<OrderPlacementPhase, OrderPlacementEvent>, FlowTransitionError>
    {
        use OrderPlacementEvent::{
            AddressCollected, BulkOrderSubmitted, OrderStarted, PaymentCollected, ResetRequested,
        };
        use OrderPlacementPhase::{AskAddress, AskPayment, Complete, Init};

        let to = match (current, event) {
            (Init, OrderStarted) => AskAddress,
            (AskAddress, AddressCollected) => AskPayment,
            (AskPayment, PaymentCollected) => Complete,
            (Init, BulkOrderSubmitted) => Complete,
            (_, ResetRequested) => Init,
            _ => return Err(invalid(self.flow_type(), current, event)),
        };

        Ok(TransitionOutcome { from: *current, to, event: *event })
    }
}

impl FlowDefinition for FraudReportFlow {
    type State = FraudPhase;
    type Event = FraudEvent;

    fn flow_type(&self) -> FlowType {
        FlowType::FraudReport
    }

    fn initial_state(&self) -> FraudPhase {
        FraudPhase::Init
    }

    fn transition(
        &self,
        current: &FraudPhase,
        event: &FraudEvent,
    ) -> Result<TransitionOutcome<FraudPhase, FraudEvent>, FlowTransitionError> {
        use FraudEvent::{
            DescriptionProvided, ImageProvided, IssueClassified, IssueReported, ResetRequested,
        };
        use FraudPhase::{ClarifyIssue, Init, Processing, RequestDescription, RequestImage};

        let to = match (current, event) {
            (Init, IssueReported) => ClarifyIssue,
            (ClarifyIssue, IssueClassified) => RequestImage,
            (RequestImage, ImageProvided) => RequestDescription,
            (RequestDescription, DescriptionProvided) => Processing,
            (_, ResetRequested) => Init,
            _ => return Err(invalid(self.flow_type(), current, event)),
        };

        Ok(TransitionOutcome { from: *current, to, event: *event })
    }
}

fn invalid(flow: FlowType, state: &impl Debug, event: &impl Debug) -> FlowTransitionError {
    FlowTransitionError::InvalidTransition {
        flow,
        state: format!("{state:?}"),
        event: format!("{event:?}"),
    }
}

/// Holds the current phase of one flow and applies events to it.
#[derive(Clone, Debug)]
pub struct FlowEngine<F: FlowDefinition> {
    flow: F,
    state: F::State,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        let state = flow.initial_state();
        Self { flow, state }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn state(&self) -> &F::State {
        &self.state
    }

    /// Applies `event` and commits the new phase. On error the phase is unchanged.
    pub fn apply(
        &mut self,
        event: F::Event,
    ) -> Result<TransitionOutcome<F::State, F::Event>, FlowTransitionError> {
        let outcome = self.flow.transition(&self.state, &event)?;
        self.state = outcome.to.clone();
        Ok(outcome)
    }

    pub fn reset(&mut self) {
        self.state = self.flow.initial_state();
    }
}

impl<F> Default for FlowEngine<F>
where
    F: FlowDefinition + Default,
{
    fn default() -> Self {
        Self::new(F::default())
    }
}
