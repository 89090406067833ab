use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    Recommendation,
    OrderPlacement,
    FraudReport,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationPhase {
    #[default]
    Gathering,
    Ready,
    Provided,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationEvent {
    ReadinessReached,
    RecommendationsDelivered,
    DissatisfactionReported,
    ResetRequested,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPlacementPhase {
    #[default]
    Init,
    AskAddress,
    AskPayment,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPlacementEvent {
    OrderStarted,
    AddressCollected,
    PaymentCollected,
    BulkOrderSubmitted,
    ResetRequested,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudPhase {
    #[default]
    Init,
    ClarifyIssue,
    RequestImage,
    RequestDescription,
    Processing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudEvent {
    IssueReported,
    IssueClassified,
    ImageProvided,
    DescriptionProvided,
    ResetRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome<S, E> {
    pub from: S,
    pub to: S,
    pub event: E,
}
