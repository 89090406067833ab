use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn};
use bookworm_core::domain::order::{
    parse_address, parse_cart, parse_payment, BulkOrderRequest, CartItem, NewOrder,
    PaymentDetails, ShippingAddress,
};
use bookworm_core::errors::ValidationError;
use bookworm_core::flows::{FlowEngine, OrderPlacementEvent, OrderPlacementFlow, OrderPlacementPhase};
use bookworm_db::OrderRepository;

use super::{AgentError, AgentKey, AgentReply, ConversationalAgent};

pub const ASK_ADDRESS: &str =
    "Please provide your shipping address in the format: Street, City, State, ZIP.";
pub const ASK_PAYMENT: &str =
    "Please provide your payment details in the format: CARD_NUMBER MM/YY CVV.";
pub const ORDER_CANCELLED: &str = "Your order has been cancelled.";
pub const PERSISTENCE_FAILURE: &str =
    "Sorry, there was an issue saving your order. Please try again.";

/// Collects a cart, an address and a payment across turns, or takes a
/// complete bulk request in one call, then persists the order.
pub struct OrderPlacementAgent {
    orders: Arc<dyn OrderRepository>,
    delivery_days: u32,
    flow: FlowEngine<OrderPlacementFlow>,
    cart: Vec<CartItem>,
    address: Option<ShippingAddress>,
    user_id: Option<String>,
}

impl OrderPlacementAgent {
    pub fn new(orders: Arc<dyn OrderRepository>, delivery_days: u32) -> Self {
        Self {
            orders,
            delivery_days,
            flow: FlowEngine::new(OrderPlacementFlow),
            cart: Vec::new(),
            address: None,
            user_id: None,
        }
    }

    pub fn phase(&self) -> OrderPlacementPhase {
        *self.flow.state()
    }

    /// Validates `{order_data, user_details}` and places the order in one step.
    /// The agent is back at `Init` afterwards whatever the outcome.
    pub async fn place_bulk(&mut self, payload: &Value) -> Result<AgentReply, AgentError> {
        self.reset();
        let request = match BulkOrderRequest::from_value(payload) {
            Ok(request) => request,
            Err(validation) => return Ok(rejected(&validation)),
        };

        self.flow.apply(OrderPlacementEvent::BulkOrderSubmitted)?;
        Ok(self.persist(request.user_id, request.items, request.address, &request.payment).await)
    }

    fn start(&mut self, turn: &ConversationTurn) -> Result<AgentReply, AgentError> {
        let cart = match turn.metadata_value("cart") {
            Some(value) => parse_cart(value),
            None => Err(ValidationError::EmptyCart),
        };
        let cart = match cart {
            Ok(cart) => cart,
            Err(validation) => return Ok(rejected(&validation)),
        };

        self.flow.apply(OrderPlacementEvent::OrderStarted)?;
        self.cart = cart;
        self.user_id = turn.user_id();
        debug!(
            event_name = "agent.order_placement.started",
            items = self.cart.len(),
            "order started from cart snapshot"
        );
        Ok(AgentReply::question(ASK_ADDRESS))
    }

    fn collect_address(&mut self, turn: &ConversationTurn) -> Result<AgentReply, AgentError> {
        let address = match parse_address(turn.text()) {
            Ok(address) => address,
            Err(validation) => return Ok(rejected(&validation)),
        };

        self.flow.apply(OrderPlacementEvent::AddressCollected)?;
        self.address = Some(address);
        Ok(AgentReply::question(ASK_PAYMENT))
    }

    async fn collect_payment(&mut self, turn: &ConversationTurn) -> Result<AgentReply, AgentError> {
        let payment = match parse_payment(turn.text()) {
            Ok(payment) => payment,
            Err(validation) => return Ok(rejected(&validation)),
        };
        let Some(user_id) = turn.user_id().or_else(|| self.user_id.clone()) else {
            return Ok(rejected(&ValidationError::MissingUserId));
        };
        let Some(address) = self.address.clone() else {
            self.reset();
            return Ok(rejected(&ValidationError::AddressFormat));
        };

        self.flow.apply(OrderPlacementEvent::PaymentCollected)?;
        let items = std::mem::take(&mut self.cart);
        Ok(self.persist(user_id, items, address, &payment).await)
    }

    async fn persist(
        &mut self,
        user_id: String,
        items: Vec<CartItem>,
        address: ShippingAddress,
        payment: &PaymentDetails,
    ) -> AgentReply {
        let order = NewOrder::new(user_id, items, address, payment, Utc::now(), self.delivery_days);
        let reply = match self.orders.create_order(&order).await {
            Ok(order_id) => {
                info!(
                    event_name = "agent.order_placement.persisted",
                    order_id = %order_id,
                    lines = order.items.len(),
                    "order placed"
                );
                AgentReply::order_confirmation(order.confirmation())
            }
            Err(cause) => {
                error!(
                    event_name = "agent.order_placement.persist_failed",
                    error = %cause,
                    "order could not be saved"
                );
                AgentReply::error(PERSISTENCE_FAILURE)
            }
        };
        self.reset();
        reply
    }
}

fn rejected(validation: &ValidationError) -> AgentReply {
    debug!(
        event_name = "agent.order_placement.rejected",
        reason = %validation,
        "order input rejected"
    );
    AgentReply::error(validation.user_message())
}

fn has_bulk_payload(turn: &ConversationTurn) -> bool {
    turn.metadata.contains_key("order_data") && turn.metadata.contains_key("user_details")
}

#[async_trait]
impl ConversationalAgent for OrderPlacementAgent {
    fn key(&self) -> AgentKey {
        AgentKey::OrderPlacement
    }

    async fn handle(
        &mut self,
        turn: &ConversationTurn,
        _memory: &mut ConversationMemory,
    ) -> Result<AgentReply, AgentError> {
        if turn.lowercase_text() == "cancel" {
            self.reset();
            return Ok(AgentReply::system(ORDER_CANCELLED));
        }
        if has_bulk_payload(turn) {
            return self.place_bulk(&Value::Object(turn.metadata.clone())).await;
        }

        match self.phase() {
            OrderPlacementPhase::Init => self.start(turn),
            OrderPlacementPhase::AskAddress => self.collect_address(turn),
            OrderPlacementPhase::AskPayment => self.collect_payment(turn).await,
            OrderPlacementPhase::Complete => {
                self.reset();
                self.start(turn)
            }
        }
    }

    fn reset(&mut self) {
        self.flow.reset();
        self.cart.clear();
        self.address = None;
        self.user_id = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Metadata};
    use bookworm_core::domain::envelope::{Payload, ResponseKind};
    use bookworm_core::flows::OrderPlacementPhase;
    use bookworm_db::InMemoryOrderRepository;

    use super::{OrderPlacementAgent, ASK_ADDRESS, ASK_PAYMENT, PERSISTENCE_FAILURE};
    use crate::agents::ConversationalAgent;

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            other => panic!("metadata must be an object, got {other}"),
        }
    }

    fn bulk_payload(card_number: &str) -> Value {
        json!({
            "order_data": [{"title": "Dune", "price": 12.50, "quantity": 2}],
            "user_details": {
                "user_id": "reader-7",
                "address": "12 Main St, Springfield, IL, 62704",
                "cardNumber": card_number,
                "expiryDate": "09/26",
                "cvv": "123"
            }
        })
    }

    #[tokio::test]
    async fn step_wise_order_collects_address_then_payment() {
        let repository = Arc::new(InMemoryOrderRepository::default());
        let mut agent = OrderPlacementAgent::new(repository.clone(), 5);
        let mut memory = ConversationMemory::default();
        let start = ConversationTurn::new(
            "I want to buy my cart",
            metadata(json!({
                "user_id": "reader-7",
                "cart": [{"title": "Dune", "Price": "12.50", "quantity": 2}]
            })),
        );

        let reply = agent.handle(&start, &mut memory).await.expect("start");
        assert_eq!(reply.message_text(), ASK_ADDRESS);
        assert_eq!(agent.phase(), OrderPlacementPhase::AskAddress);

        let address = ConversationTurn::new("12 Main St, Springfield, IL, 62704", Metadata::new());
        let reply = agent.handle(&address, &mut memory).await.expect("address");
        assert_eq!(reply.message_text(), ASK_PAYMENT);
        assert_eq!(agent.phase(), OrderPlacementPhase::AskPayment);

        let payment = ConversationTurn::new("1234567890123456 09/26 123", Metadata::new());
        let reply = agent.handle(&payment, &mut memory).await.expect("payment");

        assert_eq!(reply.kind, ResponseKind::OrderConfirmation);
        let Payload::OrderConfirmation(confirmation) = &reply.payload else {
            panic!("expected confirmation");
        };
        assert_eq!(confirmation.total_cost, "25.00");
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
        assert_eq!(repository.line_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_payment_keeps_the_phase() {
        let repository = Arc::new(InMemoryOrderRepository::default());
        let mut agent = OrderPlacementAgent::new(repository.clone(), 5);
        let mut memory = ConversationMemory::default();
        let start = ConversationTurn::new(
            "checkout",
            metadata(json!({"user_id": "reader-7", "cart": [{"title": "Dune", "price": 10}]})),
        );
        agent.handle(&start, &mut memory).await.expect("start");
        agent
            .handle(&ConversationTurn::new("1 Elm St, Austin, TX, 73301", Metadata::new()), &mut memory)
            .await
            .expect("address");

        let reply = agent
            .handle(&ConversationTurn::new("1234 09/26 123", Metadata::new()), &mut memory)
            .await
            .expect("payment");

        assert_eq!(reply.kind, ResponseKind::Error);
        assert_eq!(reply.message_text(), "Card number must be 16 digits.");
        assert_eq!(agent.phase(), OrderPlacementPhase::AskPayment);
        assert_eq!(repository.line_count().await, 0);
    }

    #[tokio::test]
    async fn missing_cart_stays_at_init() {
        let mut agent = OrderPlacementAgent::new(Arc::new(InMemoryOrderRepository::default()), 5);
        let mut memory = ConversationMemory::default();

        let reply = agent
            .handle(&ConversationTurn::new("place an order", Metadata::new()), &mut memory)
            .await
            .expect("reply");

        assert_eq!(reply.kind, ResponseKind::Error);
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
    }

    #[tokio::test]
    async fn bulk_order_is_confirmed_with_total() {
        let repository = Arc::new(InMemoryOrderRepository::default());
        let mut agent = OrderPlacementAgent::new(repository.clone(), 5);

        let reply = agent.place_bulk(&bulk_payload("1234567890123456")).await.expect("bulk");

        let Payload::OrderConfirmation(confirmation) = &reply.payload else {
            panic!("expected confirmation, got {:?}", reply.payload);
        };
        assert_eq!(confirmation.total_cost, "25.00");
        assert_eq!(confirmation.status, "success");
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
        assert_eq!(repository.line_count().await, 1);
    }

    #[tokio::test]
    async fn bulk_validation_reports_first_failure_without_persisting() {
        let repository = Arc::new(InMemoryOrderRepository::default());
        let mut agent = OrderPlacementAgent::new(repository.clone(), 5);

        let reply = agent.place_bulk(&bulk_payload("abcd123456789012")).await.expect("bulk");

        assert_eq!(reply.kind, ResponseKind::Error);
        assert_eq!(reply.message_text(), "Card number must be 16 digits.");
        assert_eq!(repository.line_count().await, 0);
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
    }

    #[tokio::test]
    async fn bulk_metadata_in_chat_takes_the_bulk_path() {
        let repository = Arc::new(InMemoryOrderRepository::default());
        let mut agent = OrderPlacementAgent::new(repository.clone(), 5);
        let mut memory = ConversationMemory::default();
        let turn = ConversationTurn::new("buy", metadata(bulk_payload("1234567890123456")));

        let reply = agent.handle(&turn, &mut memory).await.expect("bulk via chat");

        assert_eq!(reply.kind, ResponseKind::OrderConfirmation);
        assert_eq!(repository.line_count().await, 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_generic_and_resets() {
        let mut agent = OrderPlacementAgent::new(Arc::new(InMemoryOrderRepository::failing()), 5);

        let reply = agent.place_bulk(&bulk_payload("1234567890123456")).await.expect("bulk");

        assert_eq!(reply.kind, ResponseKind::Error);
        assert_eq!(reply.message_text(), PERSISTENCE_FAILURE);
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
    }

    #[tokio::test]
    async fn cancel_drops_collected_state() {
        let mut agent = OrderPlacementAgent::new(Arc::new(InMemoryOrderRepository::default()), 5);
        let mut memory = ConversationMemory::default();
        let start = ConversationTurn::new(
            "checkout",
            metadata(json!({"cart": [{"title": "Dune", "price": 10}]})),
        );
        agent.handle(&start, &mut memory).await.expect("start");

        let reply = agent
            .handle(&ConversationTurn::new("Cancel", Metadata::new()), &mut memory)
            .await
            .expect("cancel");

        assert_eq!(reply.kind, ResponseKind::System);
        assert_eq!(agent.phase(), OrderPlacementPhase::Init);
    }
}
