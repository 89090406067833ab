use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error};

use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn};
use bookworm_core::domain::envelope::ResponseKind;
use bookworm_core::domain::order::OrderId;
use bookworm_db::OrderRepository;

use super::{AgentError, AgentKey, AgentReply, ConversationalAgent};

pub const NOT_FOUND: &str = "Order not found or unauthorized access.";
pub const NO_ORDERS: &str = "No orders found.";
pub const CLARIFY: &str =
    "Would you like to see your order history or check a specific order? Please provide more details.";
const LOOKUP_FAILED: &str = "Sorry, we couldn't retrieve your orders right now. Please try again.";

const HISTORY_KEYWORDS: &[&str] = &["orders", "history", "purchases"];

/// Answers order lookups for the user named in the turn metadata. Keeps no
/// state between turns.
pub struct OrderQueryAgent {
    orders: Arc<dyn OrderRepository>,
}

impl OrderQueryAgent {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    async fn order_details(&self, order_id: &OrderId, user_id: Option<&str>) -> AgentReply {
        let Some(user_id) = user_id else {
            return AgentReply::error(NOT_FOUND);
        };
        match self.orders.find_order(order_id, user_id).await {
            Ok(Some(detail)) => AgentReply::order_info(detail.to_info(Utc::now())),
            Ok(None) => {
                debug!(
                    event_name = "agent.order_query.not_found",
                    order_id = %order_id,
                    "order missing or owned by another user"
                );
                AgentReply::error(NOT_FOUND)
            }
            Err(cause) => {
                error!(event_name = "agent.order_query.failed", error = %cause, "order lookup failed");
                AgentReply::error(LOOKUP_FAILED)
            }
        }
    }

    async fn order_history(&self, user_id: Option<&str>) -> AgentReply {
        let Some(user_id) = user_id else {
            return AgentReply::error(NO_ORDERS);
        };
        match self.orders.list_orders_for_user(user_id).await {
            Ok(orders) if orders.is_empty() => AgentReply::error(NO_ORDERS),
            Ok(orders) => {
                let now = Utc::now();
                AgentReply::order_list(orders.iter().map(|order| order.to_summary(now)).collect())
            }
            Err(cause) => {
                error!(event_name = "agent.order_query.failed", error = %cause, "order history failed");
                AgentReply::error(LOOKUP_FAILED)
            }
        }
    }
}

/// Metadata wins over free text.
fn requested_order_id(turn: &ConversationTurn) -> Option<OrderId> {
    let from_metadata = match turn.metadata_value("order_id") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(OrderId(text.trim().to_string())),
        Some(Value::Number(number)) => Some(OrderId(number.to_string())),
        _ => None,
    };
    from_metadata.or_else(|| OrderId::find_in(turn.text()))
}

fn asks_for_history(lowered: &str) -> bool {
    HISTORY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

#[async_trait]
impl ConversationalAgent for OrderQueryAgent {
    fn key(&self) -> AgentKey {
        AgentKey::OrderQuery
    }

    async fn handle(
        &mut self,
        turn: &ConversationTurn,
        _memory: &mut ConversationMemory,
    ) -> Result<AgentReply, AgentError> {
        let user_id = turn.user_id();

        if let Some(order_id) = requested_order_id(turn) {
            return Ok(self.order_details(&order_id, user_id.as_deref()).await);
        }
        if asks_for_history(&turn.lowercase_text()) {
            return Ok(self.order_history(user_id.as_deref()).await);
        }
        Ok(AgentReply::text(ResponseKind::Clarification, CLARIFY))
    }

    fn reset(&mut self) {}
}
