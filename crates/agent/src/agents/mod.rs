use async_trait::async_trait;
use thiserror::Error;

use bookworm_core::domain::book::RecommendedBook;
use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Message};
use bookworm_core::domain::envelope::{Payload, ResponseEnvelope, ResponseKind};
use bookworm_core::domain::order::{OrderConfirmation, OrderInfo, OrderSummary};
use bookworm_core::errors::ApplicationError;
use bookworm_core::flows::FlowTransitionError;

pub mod fraud;
pub mod order_placement;
pub mod order_query;
pub mod recommendation;

pub use fraud::FraudReportAgent;
pub use order_placement::OrderPlacementAgent;
pub use order_query::OrderQueryAgent;
pub use recommendation::{RecommendationAgent, RecommendationSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentKey {
    Recommendation,
    OrderQuery,
    OrderPlacement,
    FraudReport,
}

impl AgentKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recommendation => "recommendation_agent",
            Self::OrderQuery => "order_query_agent",
            Self::OrderPlacement => "order_placement_agent",
            Self::FraudReport => "fraudulent_transaction_agent",
        }
    }
}

/// The only failure an agent hands back to the operator. Collaborator
/// failures are recovered inside the agent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Flow(flow_error) => Self::Flow(flow_error),
        }
    }
}

/// One agent's answer to one turn: a kind tag plus the payload shape that
/// kind implies.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentReply {
    pub kind: ResponseKind,
    pub payload: Payload,
}

impl AgentReply {
    pub fn text(kind: ResponseKind, text: impl Into<String>) -> Self {
        Self { kind, payload: Payload::Text(text.into()) }
    }

    pub fn question(text: impl Into<String>) -> Self {
        Self::text(ResponseKind::Question, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(ResponseKind::System, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::text(ResponseKind::Error, text)
    }

    pub fn recommendations(books: Vec<RecommendedBook>) -> Self {
        Self { kind: ResponseKind::Recommendation, payload: Payload::Recommendations(books) }
    }

    pub fn order_confirmation(confirmation: OrderConfirmation) -> Self {
        Self {
            kind: ResponseKind::OrderConfirmation,
            payload: Payload::OrderConfirmation(confirmation),
        }
    }

    pub fn order_info(info: OrderInfo) -> Self {
        Self { kind: ResponseKind::OrderInfo, payload: Payload::OrderInfo(Box::new(info)) }
    }

    pub fn order_list(orders: Vec<OrderSummary>) -> Self {
        Self { kind: ResponseKind::OrderList, payload: Payload::OrderList(orders) }
    }

    pub fn is_recommendation(&self) -> bool {
        matches!(self.payload, Payload::Recommendations(_))
    }

    pub fn is_order_confirmation(&self) -> bool {
        matches!(self.payload, Payload::OrderConfirmation(_))
    }

    /// The chat-visible text of this reply. Structured payloads get a short
    /// caption; the client renders the payload itself.
    pub fn message_text(&self) -> String {
        match &self.payload {
            Payload::Text(text) => text.clone(),
            Payload::Recommendations(books) if books.is_empty() => {
                "I couldn't find matching books right now. Could you tell me a bit more about what you like?"
                    .to_string()
            }
            Payload::Recommendations(books) => {
                let titles: Vec<&str> = books.iter().map(|book| book.title.as_str()).collect();
                format!("Here are some books you might enjoy: {}.", titles.join(", "))
            }
            Payload::OrderConfirmation(confirmation) => confirmation.message.clone(),
            Payload::OrderInfo(info) => info.message.clone(),
            Payload::OrderList(orders) => match orders.len() {
                1 => "You have 1 order.".to_string(),
                count => format!("You have {count} orders."),
            },
            Payload::Other(value) => value.to_string(),
        }
    }

    pub fn message(&self) -> Message {
        Message::ai(self.message_text())
    }

    pub fn into_envelope(self) -> ResponseEnvelope {
        let messages = vec![self.message()];
        ResponseEnvelope::new(self.kind, self.payload, messages)
    }
}

/// A conversational state machine the operator can dispatch a turn to.
#[async_trait]
pub trait ConversationalAgent: Send {
    fn key(&self) -> AgentKey;

    async fn handle(
        &mut self,
        turn: &ConversationTurn,
        memory: &mut ConversationMemory,
    ) -> Result<AgentReply, AgentError>;

    /// Back to the initial phase with all collected state dropped.
    fn reset(&mut self);
}
