use serde::Serialize;
use serde_json::Value;

use crate::domain::book::RecommendedBook;
use crate::domain::conversation::Message;
use crate::domain::order::{OrderConfirmation, OrderInfo, OrderSummary};

pub const NEXT_NODE_END: &str = "END";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Question,
    Recommendation,
    OrderConfirmation,
    OrderInfo,
    OrderList,
    Clarification,
    System,
    Error,
    Resolution,
    Response,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Recommendation => "recommendation",
            Self::OrderConfirmation => "order_confirmation",
            Self::OrderInfo => "order_info",
            Self::OrderList => "order_list",
            Self::Clarification => "clarification",
            Self::System => "system",
            Self::Error => "error",
            Self::Resolution => "resolution",
            Self::Response => "response",
        }
    }
}

/// The `response` field of an envelope. Serialized without a tag; the
/// envelope's `type` says which shape to expect.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Recommendations(Vec<RecommendedBook>),
    OrderConfirmation(OrderConfirmation),
    OrderInfo(Box<OrderInfo>),
    OrderList(Vec<OrderSummary>),
    Other(Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Text(_) | Self::Other(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub response: Payload,
    pub messages: Vec<Message>,
    pub next_node: String,
}

impl ResponseEnvelope {
    pub fn new(kind: ResponseKind, response: Payload, messages: Vec<Message>) -> Self {
        Self { kind, response, messages, next_node: NEXT_NODE_END.to_string() }
    }

    /// A plain-text envelope whose single message mirrors the response.
    pub fn text(kind: ResponseKind, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(kind, Payload::Text(text.clone()), vec![Message::ai(text)])
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::text(ResponseKind::Error, text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Payload, ResponseEnvelope, ResponseKind};

    #[test]
    fn text_envelope_serializes_with_type_tag() {
        let envelope = ResponseEnvelope::text(ResponseKind::Clarification, "Which order?");
        let value = serde_json::to_value(&envelope).expect("serialize envelope");

        assert_eq!(
            value,
            json!({
                "type": "clarification",
                "response": "Which order?",
                "messages": [{"role": "ai", "content": "Which order?"}],
                "next_node": "END"
            })
        );
    }

    #[test]
    fn structured_payloads_are_flagged() {
        assert!(Payload::Recommendations(Vec::new()).is_structured());
        assert!(!Payload::Text("hi".to_owned()).is_structured());
        assert!(!Payload::Other(json!({"a": 1})).is_structured());
        assert_eq!(ResponseKind::OrderConfirmation.as_str(), "order_confirmation");
    }
}
